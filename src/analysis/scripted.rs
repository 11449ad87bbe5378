use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{AnalysisService, ServiceError};

type Scripted = Result<String, ServiceError>;

/// In-process stand-in for the analysis service.
///
/// Prompts containing a registered needle get that route's reply; anything else consumes the
/// next queued reply. An exhausted script answers with a transport error.
#[derive(Default)]
pub struct ScriptedService {
    routes: Vec<(String, Scripted)>,
    queue: Mutex<VecDeque<Scripted>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()))
    }

    pub fn fail(self, error: ServiceError) -> Self {
        self.push(Err(error))
    }

    /// Answer every prompt containing `needle` with `text`.
    pub fn route(mut self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.routes.push((needle.into(), Ok(text.into())));
        self
    }

    /// Fail every prompt containing `needle`.
    pub fn route_failure(mut self, needle: impl Into<String>, error: ServiceError) -> Self {
        self.routes.push((needle.into(), Err(error)));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    fn push(self, entry: Scripted) -> Self {
        lock(&self.queue).push_back(entry);
        self
    }
}

impl AnalysisService for ScriptedService {
    fn analyze(&self, prompt: &str) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.prompts).push(prompt.to_string());
        if let Some((_, scripted)) = self
            .routes
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
        {
            return scripted.clone();
        }
        lock(&self.queue)
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::Transport("no scripted reply left".to_string())))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
