//! Resubmission of rate-limited requests.
//!
//! The controller is pure state: it decides, and the session manager owns
//! the timer that carries the decision out.

use std::time::Duration;

use barista_transcript::ResponseInfo;
use serde_json::Value;

/// What to do about a finished response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Resend the last request after `delay`. `attempt` is 1-based.
    Retry { attempt: u32, delay: Duration },
    /// The retry budget is spent; the request is abandoned and the counter
    /// starts over.
    GiveUp { max_retries: u32 },
    /// A successful response cleared the counter.
    Reset,
    /// A failure of another kind; retry state is left alone.
    Unchanged,
}

/// Tracks the most recent request and how many times it has been resent.
///
/// A rate-limited response yields [`RetryDecision::Retry`] with a fixed
/// delay until `max_retries` resends have been spent, then
/// [`RetryDecision::GiveUp`]. A response that did not fail resets the count.
#[derive(Debug, Clone)]
pub struct RetryController {
    max_retries: u32,
    delay: Duration,
    count: u32,
    last_request: Option<Value>,
}

impl RetryController {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            count: 0,
            last_request: None,
        }
    }

    /// Remembers a newly sent request. A new request supersedes any retry
    /// interest in the previous one.
    pub fn record_request(&mut self, request: Value) {
        self.count = 0;
        self.last_request = Some(request);
    }

    pub fn on_response_done(&mut self, response: &ResponseInfo) -> RetryDecision {
        if response.is_rate_limited() {
            if self.count < self.max_retries {
                self.count += 1;
                RetryDecision::Retry {
                    attempt: self.count,
                    delay: self.delay,
                }
            } else {
                self.count = 0;
                RetryDecision::GiveUp {
                    max_retries: self.max_retries,
                }
            }
        } else if !response.is_failed() {
            self.count = 0;
            RetryDecision::Reset
        } else {
            RetryDecision::Unchanged
        }
    }

    /// The request a scheduled retry will resend.
    pub fn last_request(&self) -> Option<&Value> {
        self.last_request.as_ref()
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_message(&self, attempt: u32) -> String {
        format!(
            "Rate limit exceeded, retrying in {} seconds (Attempt {}/{})",
            self.delay.as_secs(),
            attempt,
            self.max_retries
        )
    }

    pub fn give_up_message(&self) -> String {
        format!(
            "Rate limit exceeded - maximum retries ({}) reached. Request abandoned.",
            self.max_retries
        )
    }
}
