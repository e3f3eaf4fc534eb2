//! Mock collaborators for exercising checks and delivery without a network.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use url::Url;

use crate::error::Error;
use crate::fetch::{FetchResponse, Fetcher};
use crate::messenger::Messenger;

/// Fetcher returning one fixed response for every URL, counting calls.
pub struct MockFetcher {
    status: u16,
    body: String,
    calls: AtomicUsize,
}

impl MockFetcher {
    pub fn always(status: u16, body: &str) -> MockFetcher {
        MockFetcher {
            status,
            body: body.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, _url: &Url) -> Result<FetchResponse, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(FetchResponse {
            status: self.status,
            body: self.body.clone(),
        })
    }
}

/// Messenger recording deliveries, with configurable failures.
pub struct MockMessenger {
    sent: Mutex<Vec<(String, String)>>,
    attempts: Mutex<HashMap<String, u32>>,
    fail_recipient: Option<String>,
    fail_remaining: AtomicU32,
}

impl MockMessenger {
    pub fn new() -> MockMessenger {
        MockMessenger {
            sent: Mutex::new(Vec::new()),
            attempts: Mutex::new(HashMap::new()),
            fail_recipient: None,
            fail_remaining: AtomicU32::new(0),
        }
    }

    /// Every send to `recipient` fails with a transport error.
    pub fn failing_for(recipient: &str) -> MockMessenger {
        MockMessenger {
            fail_recipient: Some(recipient.to_string()),
            ..MockMessenger::new()
        }
    }

    /// The first `n` sends fail with a transport error, the rest succeed.
    pub fn failing_first(n: u32) -> MockMessenger {
        MockMessenger {
            fail_remaining: AtomicU32::new(n),
            ..MockMessenger::new()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    pub fn attempts_for(&self, recipient: &str) -> u32 {
        self.attempts.lock().get(recipient).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Messenger for MockMessenger {
    async fn send(&self, recipient: &str, text: &str) -> Result<(), Error> {
        *self.attempts.lock().entry(recipient.to_string()).or_insert(0) += 1;

        if self.fail_recipient.as_deref() == Some(recipient) {
            return Err(Error::Send(format!("mock failure for {recipient}")));
        }
        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Send("mock transient failure".to_string()));
        }

        self.sent.lock().push((recipient.to_string(), text.to_string()));
        Ok(())
    }
}
