//! Outbound notifications: email through `sendmail`, SMS through `gammu`.
//!
//! Email sends are fire-and-forget. SMS sends go through a FIFO queue
//! with at most one message in flight, because the modem serializes
//! poorly; the next message is submitted only when the previous send
//! reports completion, successful or not.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error};

use crate::ports::{ProcessHost, SpawnOutcome, SpawnRequest};

struct SmsMessage {
    to: String,
    text: String,
}

#[derive(Default)]
struct SmsQueue {
    busy: bool,
    pending: VecDeque<SmsMessage>,
}

struct NotifierInner {
    processes: Arc<dyn ProcessHost>,
    sms: Mutex<SmsQueue>,
}

/// Sends emails and SMS messages through host processes. Cheap to clone;
/// clones share the SMS queue.
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<NotifierInner>,
}

impl Notifier {
    #[must_use]
    pub fn new(processes: Arc<dyn ProcessHost>) -> Self {
        Self {
            inner: Arc::new(NotifierInner {
                processes,
                sms: Mutex::new(SmsQueue::default()),
            }),
        }
    }

    /// Send an email via the local `sendmail`. Returns as soon as the
    /// process is spawned; a failed send is logged, not returned.
    pub fn send_email(&self, to: &str, subject: &str, text: &str) {
        debug!(to, "sending email");
        let request = SpawnRequest::shell(format!("/usr/sbin/sendmail '{to}'"))
            .with_stdin(format!("Subject: {subject}\n\n{text}"))
            .capture_output();
        let to = to.to_string();
        self.inner.processes.spawn(
            request,
            Box::new(move |outcome| {
                if !outcome.success() {
                    error!(
                        to,
                        status = outcome.exit_status,
                        stdout = outcome.stdout.as_deref().unwrap_or(""),
                        stderr = outcome.stderr.as_deref().unwrap_or(""),
                        "sendmail failed"
                    );
                }
            }),
        );
    }

    /// Queue an SMS. Messages to the modem are sent strictly in order,
    /// one at a time.
    pub fn send_sms(&self, to: &str, text: &str) {
        let message = SmsMessage {
            to: to.to_string(),
            text: text.to_string(),
        };
        let start = {
            let mut queue = self.lock_queue();
            queue.pending.push_back(message);
            if queue.busy {
                false
            } else {
                queue.busy = true;
                true
            }
        };
        if start {
            self.submit_next();
        }
    }

    /// Submit the head of the queue to the modem. Caller must have set
    /// the busy flag.
    fn submit_next(&self) {
        let message = {
            let mut queue = self.lock_queue();
            match queue.pending.pop_front() {
                Some(message) => message,
                None => {
                    queue.busy = false;
                    return;
                }
            }
        };
        debug!(to = message.to, "sending sms");
        let request = SpawnRequest::shell(format!(
            "wb-gsm restart_if_broken && gammu sendsms TEXT '{}' -unicode",
            message.to
        ))
        .with_stdin(message.text)
        .capture_output();
        let notifier = self.clone();
        let to = message.to;
        self.inner.processes.spawn(
            request,
            Box::new(move |outcome| notifier.sms_finished(&to, &outcome)),
        );
    }

    /// Completion of an SMS send. The queue advances even when the send
    /// failed, so one bad message cannot wedge the modem queue.
    fn sms_finished(&self, to: &str, outcome: &SpawnOutcome) {
        if !outcome.success() {
            error!(
                to,
                status = outcome.exit_status,
                stdout = outcome.stdout.as_deref().unwrap_or(""),
                stderr = outcome.stderr.as_deref().unwrap_or(""),
                "sms send failed"
            );
        }
        self.submit_next();
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, SmsQueue> {
        self.inner.sms.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
