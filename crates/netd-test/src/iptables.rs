//! Recording [`IptablesExecutor`] for controller tests.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use netd_common::{ExecResult, IpFamily, IptablesExecutor, NetdError, NetdResult};

#[derive(Debug, Default)]
struct State {
    commands: Vec<(IpFamily, String)>,
    restores: Vec<(IpFamily, String)>,
    exit_codes: VecDeque<i32>,
    restore_outputs: VecDeque<String>,
    restore_failures: usize,
}

/// Executor that records everything and runs nothing.
///
/// - Single commands exit with the next queued code, or 0 once the queue
///   is empty.
/// - Restore batches succeed unless a failure was queued with
///   [`FakeIptables::fail_next_restores`].
/// - Output-returning restores pop the next queued output; an empty queue
///   behaves like a restore binary that could not be run.
#[derive(Debug, Default)]
pub struct FakeIptables {
    state: Mutex<State>,
}

impl FakeIptables {
    /// Creates an empty fake.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queues exit codes for the next single commands, in issue order.
    pub fn set_return_values(&self, codes: impl IntoIterator<Item = i32>) {
        self.state().exit_codes.extend(codes);
    }

    /// Queues one output for the next output-returning restore.
    pub fn add_restore_output(&self, output: impl Into<String>) {
        self.state().restore_outputs.push_back(output.into());
    }

    /// Makes the next `count` restore batches fail.
    pub fn fail_next_restores(&self, count: usize) {
        self.state().restore_failures += count;
    }

    /// Returns and clears the recorded single commands.
    pub fn take_commands(&self) -> Vec<(IpFamily, String)> {
        std::mem::take(&mut self.state().commands)
    }

    /// Returns and clears the recorded restore batches.
    pub fn take_restores(&self) -> Vec<(IpFamily, String)> {
        std::mem::take(&mut self.state().restores)
    }

    fn record_restore(&self, family: IpFamily, input: &str) -> NetdResult<()> {
        let mut state = self.state();
        state.restores.push((family, input.to_string()));
        if state.restore_failures > 0 {
            state.restore_failures -= 1;
            return Err(restore_failed(family));
        }
        Ok(())
    }
}

fn restore_failed(family: IpFamily) -> NetdError {
    NetdError::ShellCommandFailed {
        command: format!("fake {} restore", family),
        exit_code: 1,
        output: String::new(),
    }
}

#[async_trait]
impl IptablesExecutor for FakeIptables {
    async fn iptables(&self, family: IpFamily, args: &str) -> NetdResult<ExecResult> {
        let mut state = self.state();
        state.commands.push((family, args.to_string()));
        let exit_code = state.exit_codes.pop_front().unwrap_or(0);
        Ok(ExecResult {
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    async fn iptables_restore(&self, family: IpFamily, input: &str) -> NetdResult<()> {
        self.record_restore(family, input)
    }

    async fn iptables_restore_output(&self, family: IpFamily, input: &str) -> NetdResult<String> {
        self.record_restore(family, input)?;
        self.state()
            .restore_outputs
            .pop_front()
            .ok_or_else(|| restore_failed(family))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_exit_codes() {
        let fake = FakeIptables::new();
        fake.set_return_values([1, 0]);

        let r1 = fake.iptables(IpFamily::V4, "-F bw_costly_wlan0").await.unwrap();
        let r2 = fake.iptables(IpFamily::V6, "-F bw_costly_wlan0").await.unwrap();
        let r3 = fake.iptables(IpFamily::V4, "-N bw_costly_wlan0").await.unwrap();
        assert_eq!(r1.exit_code, 1);
        assert!(r2.success());
        assert!(r3.success());

        let cmds = fake.take_commands();
        assert_eq!(cmds.len(), 3);
        assert_eq!(cmds[1], (IpFamily::V6, "-F bw_costly_wlan0".to_string()));
        assert!(fake.take_commands().is_empty());
    }

    #[tokio::test]
    async fn test_restore_output_queue() {
        let fake = FakeIptables::new();
        fake.add_restore_output("-N bw_costly_shared\n");

        let out = fake
            .iptables_restore_output(IpFamily::V4, "*filter\n-S\nCOMMIT\n")
            .await
            .unwrap();
        assert_eq!(out, "-N bw_costly_shared\n");
        assert!(fake
            .iptables_restore_output(IpFamily::V6, "*filter\n-S\nCOMMIT\n")
            .await
            .is_err());
        assert_eq!(fake.take_restores().len(), 2);
    }

    #[tokio::test]
    async fn test_restore_failure() {
        let fake = FakeIptables::new();
        fake.fail_next_restores(1);
        assert!(fake.iptables_restore(IpFamily::V4, "x").await.is_err());
        assert!(fake.iptables_restore(IpFamily::V4, "x").await.is_ok());
    }
}
