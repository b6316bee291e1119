//! Test utilities for bridge and session tests
//!
//! Provides a scripted [`CommandRunner`](crate::command::CommandRunner)
//! replacement that replays queued results and records every request.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use devdroid_core::prelude::*;

use crate::command::{CommandOutput, CommandRequest, LocalCommandRunner};

/// Replays queued results in order and records every request made.
///
/// Cloning shares the script and the recorded requests, so a test can hand
/// one clone to the code under test and keep another for assertions. Once
/// the script runs dry, further invocations succeed with empty output, so
/// readiness probes and retries don't need to be scripted exhaustively.
#[derive(Clone)]
pub struct ScriptedRunner {
    results: Arc<Mutex<VecDeque<Result<Option<CommandOutput>>>>>,
    calls: Arc<Mutex<Vec<CommandRequest>>>,
}

impl ScriptedRunner {
    pub fn new(results: Vec<Result<Option<CommandOutput>>>) -> Self {
        Self {
            results: Arc::new(Mutex::new(results.into())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A successful invocation producing `stdout`.
    pub fn ok(stdout: &str) -> Result<Option<CommandOutput>> {
        Ok(Some(CommandOutput {
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }))
    }

    /// A completed invocation with a non-zero exit and stderr text.
    pub fn failed(code: i32, stderr: &str) -> Result<Option<CommandOutput>> {
        Ok(Some(CommandOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }))
    }

    /// The checked-failure outcome: the runner swallowed a non-zero exit.
    pub fn suppressed() -> Result<Option<CommandOutput>> {
        Ok(None)
    }

    /// Argv of the `index`-th recorded request.
    pub fn argv(&self, index: usize) -> Vec<String> {
        self.calls.lock().unwrap()[index].args.clone()
    }

    /// Program plus argv of every recorded request, flattened for assertions.
    pub fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.display())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl LocalCommandRunner for ScriptedRunner {
    async fn run(&self, request: CommandRequest) -> Result<Option<CommandOutput>> {
        self.calls.lock().unwrap().push(request);
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ScriptedRunner::ok(""))
    }
}
