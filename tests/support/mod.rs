//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fetchbind::request::Transport;
use fetchbind::Error;

/// One scripted transport outcome.
pub enum Outcome {
    Timeout,
    Fatal,
    Ok(u16, &'static str),
}

/// Transport replaying a fixed script of outcomes, then timing out.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Outcome>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Outcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    /// A transport that always times out.
    pub fn always_timeout() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let url = request.url().to_string();
        let next = self.script.lock().unwrap().pop_front();
        match next {
            None | Some(Outcome::Timeout) => Err(Error::timeout(url)),
            Some(Outcome::Fatal) => Err(Error::transport(url, "certificate rejected")),
            Some(Outcome::Ok(status, body)) => {
                let response = http::Response::builder()
                    .status(status)
                    .body(body)
                    .unwrap();
                Ok(reqwest::Response::from(response))
            }
        }
    }
}
