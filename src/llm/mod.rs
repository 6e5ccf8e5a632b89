//! OpenAI-compatible chat-completion client.

pub mod client;
pub mod types;

pub use client::{ChatModel, Completion, LlmError, OpenAiClient};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::{ChatModel, Completion, LlmError};

    /// Scripted model: replies with `reply(prompt)` unless the prompt contains
    /// one of the `fail_on` needles, and records every prompt it sees. Prompts
    /// matching a `slow_on` needle sleep first.
    pub struct FakeModel {
        reply: Box<dyn Fn(&str) -> String + Send + Sync>,
        pub fail_on: Vec<String>,
        pub slow_on: Vec<(String, Duration)>,
        calls: AtomicUsize,
        pub prompts: Mutex<Vec<String>>,
        pub temperatures: Mutex<Vec<f32>>,
    }

    impl FakeModel {
        pub fn new(reply: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
            Self {
                reply: Box::new(reply),
                fail_on: Vec::new(),
                slow_on: Vec::new(),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
                temperatures: Mutex::new(Vec::new()),
            }
        }

        pub fn fixed(reply: &str) -> Self {
            let reply = reply.to_string();
            Self::new(move |_| reply.clone())
        }

        pub fn failing_on(mut self, needle: &str) -> Self {
            self.fail_on.push(needle.to_string());
            self
        }

        pub fn slow_on(mut self, needle: &str, delay: Duration) -> Self {
            self.slow_on.push((needle.to_string(), delay));
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ChatModel for FakeModel {
        async fn complete(&self, completion: Completion<'_>) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(completion.prompt.to_string());
            self.temperatures.lock().unwrap().push(completion.temperature);
            let delay = self
                .slow_on
                .iter()
                .find(|(n, _)| completion.prompt.contains(n.as_str()))
                .map(|(_, d)| *d);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_on.iter().any(|n| completion.prompt.contains(n.as_str())) {
                return Err(LlmError::Api {
                    code: 500,
                    message: "scripted failure".into(),
                });
            }
            Ok((self.reply)(completion.prompt))
        }
    }
}
