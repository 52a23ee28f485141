//! Bandwidth Controller - quota, alert and app-list rule management
//!
//! Owns every piece of tracked state (per-interface quotas, the shared
//! quota group, the global alert) and turns each request into executor
//! calls built by [`crate::commands`]. Operations run to completion one at
//! a time; callers that share a controller across tasks wrap it in a mutex.

use std::collections::HashMap;
use std::sync::Arc;

use netd_common::{
    IpFamily, IptablesExecutor, IptablesTarget, NetdError, NetdResult, ResponseSink,
};
use tracing::{debug, info, instrument, warn};

use crate::chains::{
    costly_chain, interface_alert_name, quota_names, BW_COSTLY_SHARED, BW_HAPPY_BOX,
    BW_PENALTY_BOX,
};
use crate::commands::*;
use crate::costly::PrepResults;
use crate::quota::QuotaUpdater;
use crate::shared_quota::SharedQuotaGroup;
use crate::tether_stats::{self, TetherFilter};
use crate::types::{
    validate_bytes, validate_iface, AppUid, InterfaceQuota, IptOp, UidRange, SYSTEM_UID_RANGE,
};

/// Bandwidth Controller
///
/// Programs the `bw_*` chain hierarchy and tracks what it has programmed.
pub struct BandwidthCtrl {
    ipt: Arc<dyn IptablesExecutor>,
    quota: QuotaUpdater,

    /// Range exempted from the happy box on first run
    system_uids: UidRange,

    /// Interfaces with their own costly chain
    quota_ifaces: HashMap<String, InterfaceQuota>,

    /// Interfaces sharing `bw_costly_shared`
    shared: SharedQuotaGroup,

    /// Global alert threshold; 0 when unset
    global_alert_bytes: u64,

    /// Number of requesters of the global alert in the forward chain
    global_alert_tether_count: u32,
}

impl BandwidthCtrl {
    /// Create a new controller over the given executor and quota updater
    pub fn new(ipt: Arc<dyn IptablesExecutor>, quota: QuotaUpdater) -> Self {
        Self {
            ipt,
            quota,
            system_uids: SYSTEM_UID_RANGE,
            quota_ifaces: HashMap::new(),
            shared: SharedQuotaGroup::new(),
            global_alert_bytes: 0,
            global_alert_tether_count: 0,
        }
    }

    /// Override the system UID range (builder pattern)
    pub fn with_system_uids(mut self, range: UidRange) -> Self {
        self.system_uids = range;
        self
    }

    /// Tracked quota for an interface with its own chain
    pub fn interface_quota(&self, iface: &str) -> Option<InterfaceQuota> {
        self.quota_ifaces.get(iface).copied()
    }

    /// Shared quota group state
    pub fn shared_quota(&self) -> &SharedQuotaGroup {
        &self.shared
    }

    /// Global alert threshold; 0 when unset
    pub fn global_alert_bytes(&self) -> u64 {
        self.global_alert_bytes
    }

    /// Number of forward-chain global alert requesters
    pub fn global_alert_tether_count(&self) -> u32 {
        self.global_alert_tether_count
    }

    /// Where new INPUT/OUTPUT jumps go: after the global alert when it
    /// occupies rule 1.
    fn rule_index(&self) -> u32 {
        if self.global_alert_bytes > 0 {
            2
        } else {
            1
        }
    }

    fn reset_state(&mut self) {
        self.quota_ifaces.clear();
        self.shared.clear();
        self.global_alert_bytes = 0;
        self.global_alert_tether_count = 0;
    }

    async fn restore(&self, target: IptablesTarget, batch: &str) -> NetdResult<()> {
        for family in target.families() {
            self.ipt.iptables_restore(*family, batch).await?;
        }
        Ok(())
    }

    /// Runs one rule command on IPv4 then IPv6.
    ///
    /// Both families are always attempted; unless `ignore_failure` is set,
    /// a non-zero exit on either fails the call once both have run.
    async fn run_cmd(&self, args: &str, ignore_failure: bool) -> NetdResult<()> {
        let mut failure = None;
        for family in IptablesTarget::V4V6.families() {
            let result = self.ipt.iptables(*family, args).await?;
            if !result.success() && !ignore_failure && failure.is_none() {
                failure = Some((*family, result));
            }
        }
        match failure {
            None => Ok(()),
            Some((family, result)) => Err(NetdError::ShellCommandFailed {
                command: format!("{} {}", family, args),
                exit_code: result.exit_code,
                output: result.combined_output(),
            }),
        }
    }

    /// Runs every command even if some fail, reporting the first failure.
    async fn run_cmds_all(&self, cmds: &[String]) -> NetdResult<()> {
        let mut first_err = None;
        for cmd in cmds {
            if let Err(e) = self.run_cmd(cmd, false).await {
                warn!(command = %cmd, error = %e, "Rule removal failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    // ---- setup / teardown ----

    async fn apply_hooks(&mut self, delete_orphans: bool) -> NetdResult<()> {
        self.reset_state();

        let listing = self
            .ipt
            .iptables_restore_output(IpFamily::V4, &build_list_chains_batch())
            .await?;
        let orphans = find_orphan_chains(&listing);
        if let Some(batch) = build_orphan_cleanup_batch(&orphans, delete_orphans) {
            info!(count = orphans.len(), delete = delete_orphans, "Cleaning up orphaned costly chains");
            self.restore(IptablesTarget::V4V6, &batch).await?;
        }

        self.restore(IptablesTarget::V4V6, &build_flush_batch()).await
    }

    /// Flushes the fixed hierarchy and removes leftover per-interface chains.
    #[instrument(skip(self))]
    pub async fn setup_hooks(&mut self) -> NetdResult<()> {
        self.apply_hooks(true).await
    }

    /// Rebuilds the hierarchy and installs the accounting rules.
    #[instrument(skip(self))]
    pub async fn enable(&mut self, first_run: bool) -> NetdResult<()> {
        self.apply_hooks(false).await?;
        let system_uids = first_run.then_some(self.system_uids);
        self.restore(IptablesTarget::V4V6, &build_accounting_batch(system_uids))
            .await?;
        info!("Bandwidth control enabled");
        Ok(())
    }

    /// Flushes the hierarchy, leaving the fixed chains in place.
    #[instrument(skip(self))]
    pub async fn disable(&mut self) -> NetdResult<()> {
        self.apply_hooks(false).await?;
        info!("Bandwidth control disabled");
        Ok(())
    }

    /// Switches rule 1 of the data-saver chain between REJECT and RETURN.
    #[instrument(skip(self))]
    pub async fn set_data_saver(&mut self, enable: bool) -> NetdResult<()> {
        self.restore(IptablesTarget::V4V6, &build_data_saver_batch(enable))
            .await
    }

    // ---- per-interface quota ----

    async fn prepare_costly_chain(&self, chain: &str) -> NetdResult<()> {
        let flush = build_flush_chain_cmd(chain);
        let create = build_new_chain_cmd(chain);
        let families = IptablesTarget::V4V6.families();

        let mut results = PrepResults::default();
        for family in families {
            let r = self.ipt.iptables(*family, &flush).await?;
            results.record_flush(*family, r.success());
        }
        for family in families {
            let r = self.ipt.iptables(*family, &create).await?;
            results.record_create(*family, r.success());
        }
        let outcomes = results.evaluate(chain)?;
        debug!(chain, ?outcomes, "Prepared costly chain");

        self.run_cmd(&build_penalty_jump_cmd(chain), false).await
    }

    async fn link_costly_chain(&self, iface: &str, chain: &str) -> NetdResult<()> {
        for step in build_link_steps(iface, chain, self.rule_index()) {
            self.run_cmd(&step.args, step.ignore_failure).await?;
        }
        Ok(())
    }

    /// Sets a quota on an interface with its own costly chain.
    ///
    /// The first call builds and links the chain; later calls rewrite the
    /// live counter without touching any rule.
    #[instrument(skip(self))]
    pub async fn set_interface_quota(&mut self, iface: &str, bytes: u64) -> NetdResult<()> {
        validate_iface(iface)?;
        validate_bytes("bytes", bytes)?;

        if let Some(entry) = self.quota_ifaces.get_mut(iface) {
            self.quota.update_quota(iface, bytes)?;
            entry.quota = bytes;
            return Ok(());
        }

        let chain = costly_chain(iface);
        self.prepare_costly_chain(&chain).await?;
        self.link_costly_chain(iface, &chain).await?;
        self.run_cmd(&build_quota_cmd(IptOp::Append, &chain, bytes, iface), false)
            .await?;

        self.quota_ifaces
            .insert(iface.to_string(), InterfaceQuota::new(bytes));
        info!("Set quota for {} to {}", iface, bytes);
        Ok(())
    }

    /// Unlinks and deletes an interface's costly chain.
    #[instrument(skip(self))]
    pub async fn remove_interface_quota(&mut self, iface: &str) -> NetdResult<()> {
        validate_iface(iface)?;
        if !self.quota_ifaces.contains_key(iface) {
            return Err(NetdError::not_found("interface quota", iface));
        }

        let chain = costly_chain(iface);
        let mut cmds = build_unlink_cmds(iface, &chain);
        cmds.push(build_flush_chain_cmd(&chain));
        cmds.push(build_delete_chain_cmd(&chain));
        let result = self.run_cmds_all(&cmds).await;

        self.quota_ifaces.remove(iface);
        info!("Removed quota for {}", iface);
        result
    }

    /// Reads the remaining quota of an interface from its live counter.
    #[instrument(skip(self))]
    pub async fn get_interface_quota(&self, iface: &str) -> NetdResult<u64> {
        validate_iface(iface)?;
        self.quota.read_quota(iface)
    }

    // ---- shared quota ----

    /// Adds an interface to the shared quota group.
    #[instrument(skip(self))]
    pub async fn set_interface_shared_quota(&mut self, iface: &str, bytes: u64) -> NetdResult<()> {
        validate_iface(iface)?;
        validate_bytes("bytes", bytes)?;

        let plan = self.shared.plan_add(iface, bytes);
        if plan.is_noop() {
            debug!("Shared quota unchanged");
            return Ok(());
        }

        if plan.link {
            self.link_costly_chain(iface, BW_COSTLY_SHARED).await?;
        }
        if plan.insert_quota_rule {
            let cmd = build_quota_cmd(IptOp::Insert, BW_COSTLY_SHARED, bytes, quota_names::SHARED);
            self.run_cmd(&cmd, false).await?;
        }
        if let Some(new_quota) = plan.update_quota {
            self.quota.update_quota(quota_names::SHARED, new_quota)?;
        }

        self.shared.commit_add(iface, bytes);
        info!("Set shared quota for {} to {}", iface, bytes);
        Ok(())
    }

    /// Removes an interface from the shared quota group.
    ///
    /// The quota rule and shared alert go away with the last member.
    #[instrument(skip(self))]
    pub async fn remove_interface_shared_quota(&mut self, iface: &str) -> NetdResult<()> {
        let plan = self.shared.plan_remove(iface)?;

        let mut cmds = build_unlink_cmds(iface, BW_COSTLY_SHARED);
        if let Some(quota) = plan.delete_quota_rule {
            cmds.push(build_quota_cmd(
                IptOp::Delete,
                BW_COSTLY_SHARED,
                quota,
                quota_names::SHARED,
            ));
        }
        let mut result = self.run_cmds_all(&cmds).await;

        if let Some(alert) = plan.delete_alert {
            let alert_result = self
                .remove_costly_alert(BW_COSTLY_SHARED, quota_names::SHARED_ALERT, alert)
                .await;
            if result.is_ok() {
                result = alert_result;
            }
        }

        self.shared.commit_remove(iface);
        info!("Removed shared quota for {}", iface);
        result
    }

    // ---- alerts ----

    /// Inserts or deletes an alert rule pair in `bw_INPUT`/`bw_OUTPUT`.
    pub async fn run_alert_cmd(&self, op: IptOp, name: &str, bytes: u64) -> NetdResult<()> {
        self.restore(IptablesTarget::V4V6, &build_alert_batch(op, name, bytes))
            .await
    }

    /// Inserts or deletes an alert rule in `bw_FORWARD`.
    pub async fn run_alert_forward_cmd(&self, op: IptOp, name: &str, bytes: u64) -> NetdResult<()> {
        self.restore(
            IptablesTarget::V4V6,
            &build_alert_forward_batch(op, name, bytes),
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn set_global_alert(&mut self, bytes: u64) -> NetdResult<()> {
        validate_bytes("bytes", bytes)?;

        if self.global_alert_bytes > 0 {
            self.quota.update_quota(quota_names::GLOBAL_ALERT, bytes)?;
        } else {
            self.run_alert_cmd(IptOp::Insert, quota_names::GLOBAL_ALERT, bytes)
                .await?;
            if self.global_alert_tether_count > 0 {
                self.run_alert_forward_cmd(IptOp::Insert, quota_names::GLOBAL_ALERT, bytes)
                    .await?;
            }
        }
        self.global_alert_bytes = bytes;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove_global_alert(&mut self) -> NetdResult<()> {
        let bytes = self.global_alert_bytes;
        if bytes == 0 {
            return Err(NetdError::not_found("alert", quota_names::GLOBAL_ALERT));
        }

        self.run_alert_cmd(IptOp::Delete, quota_names::GLOBAL_ALERT, bytes)
            .await?;
        if self.global_alert_tether_count > 0 {
            self.run_alert_forward_cmd(IptOp::Delete, quota_names::GLOBAL_ALERT, bytes)
                .await?;
        }
        self.global_alert_bytes = 0;
        Ok(())
    }

    /// Registers one more user of the global alert in the forward chain.
    #[instrument(skip(self))]
    pub async fn set_global_alert_in_forward_chain(&mut self) -> NetdResult<()> {
        if self.global_alert_tether_count == 0 && self.global_alert_bytes > 0 {
            self.run_alert_forward_cmd(
                IptOp::Insert,
                quota_names::GLOBAL_ALERT,
                self.global_alert_bytes,
            )
            .await?;
        }
        self.global_alert_tether_count += 1;
        Ok(())
    }

    /// Drops one user of the global alert in the forward chain.
    #[instrument(skip(self))]
    pub async fn remove_global_alert_in_forward_chain(&mut self) -> NetdResult<()> {
        if self.global_alert_tether_count == 0 {
            return Err(NetdError::not_found(
                "forward alert requester",
                quota_names::GLOBAL_ALERT,
            ));
        }
        if self.global_alert_tether_count == 1 && self.global_alert_bytes > 0 {
            self.run_alert_forward_cmd(
                IptOp::Delete,
                quota_names::GLOBAL_ALERT,
                self.global_alert_bytes,
            )
            .await?;
        }
        self.global_alert_tether_count -= 1;
        Ok(())
    }

    async fn set_costly_alert(
        &self,
        chain: &str,
        alert_name: &str,
        current: u64,
        bytes: u64,
    ) -> NetdResult<()> {
        validate_bytes("bytes", bytes)?;
        if current > 0 {
            self.quota.update_quota(alert_name, bytes)
        } else {
            let cmd = build_costly_alert_cmd(IptOp::Append, chain, bytes, alert_name);
            self.run_cmd(&cmd, false).await
        }
    }

    async fn remove_costly_alert(&self, chain: &str, alert_name: &str, current: u64) -> NetdResult<()> {
        let cmd = build_costly_alert_cmd(IptOp::Delete, chain, current, alert_name);
        self.run_cmd(&cmd, false).await
    }

    #[instrument(skip(self))]
    pub async fn set_shared_alert(&mut self, bytes: u64) -> NetdResult<()> {
        if self.shared.is_empty() {
            return Err(NetdError::not_found("shared quota", quota_names::SHARED));
        }
        self.set_costly_alert(
            BW_COSTLY_SHARED,
            quota_names::SHARED_ALERT,
            self.shared.alert(),
            bytes,
        )
        .await?;
        self.shared.set_alert(bytes);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove_shared_alert(&mut self) -> NetdResult<()> {
        let current = self.shared.alert();
        if current == 0 {
            return Err(NetdError::not_found("alert", quota_names::SHARED_ALERT));
        }
        self.remove_costly_alert(BW_COSTLY_SHARED, quota_names::SHARED_ALERT, current)
            .await?;
        self.shared.set_alert(0);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_interface_alert(&mut self, iface: &str, bytes: u64) -> NetdResult<()> {
        validate_iface(iface)?;
        let entry = self
            .interface_quota(iface)
            .ok_or_else(|| NetdError::not_found("interface quota", iface))?;

        self.set_costly_alert(
            &costly_chain(iface),
            &interface_alert_name(iface),
            entry.alert,
            bytes,
        )
        .await?;
        if let Some(entry) = self.quota_ifaces.get_mut(iface) {
            entry.alert = bytes;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove_interface_alert(&mut self, iface: &str) -> NetdResult<()> {
        validate_iface(iface)?;
        let entry = self
            .interface_quota(iface)
            .ok_or_else(|| NetdError::not_found("interface quota", iface))?;
        if !entry.has_alert() {
            return Err(NetdError::not_found("alert", interface_alert_name(iface)));
        }

        self.remove_costly_alert(&costly_chain(iface), &interface_alert_name(iface), entry.alert)
            .await?;
        if let Some(entry) = self.quota_ifaces.get_mut(iface) {
            entry.alert = 0;
        }
        Ok(())
    }

    // ---- app lists ----

    async fn run_app_cmd(&self, op: IptOp, chain: &str, target: &str, uids: &[AppUid]) -> NetdResult<()> {
        if uids.is_empty() {
            debug!(chain, "No uids given");
            return Ok(());
        }
        self.restore(
            IptablesTarget::V4V6,
            &build_app_batch(op, chain, target, uids),
        )
        .await
    }

    /// Exempts uids from the penalty path.
    #[instrument(skip(self))]
    pub async fn add_nice_apps(&mut self, uids: &[AppUid]) -> NetdResult<()> {
        self.run_app_cmd(IptOp::Insert, BW_HAPPY_BOX, "RETURN", uids)
            .await
    }

    #[instrument(skip(self))]
    pub async fn remove_nice_apps(&mut self, uids: &[AppUid]) -> NetdResult<()> {
        self.run_app_cmd(IptOp::Delete, BW_HAPPY_BOX, "RETURN", uids)
            .await
    }

    /// Rejects all costly traffic of these uids.
    #[instrument(skip(self))]
    pub async fn add_naughty_apps(&mut self, uids: &[AppUid]) -> NetdResult<()> {
        self.run_app_cmd(IptOp::Insert, BW_PENALTY_BOX, "REJECT", uids)
            .await
    }

    #[instrument(skip(self))]
    pub async fn remove_naughty_apps(&mut self, uids: &[AppUid]) -> NetdResult<()> {
        self.run_app_cmd(IptOp::Delete, BW_PENALTY_BOX, "REJECT", uids)
            .await
    }

    // ---- tether stats ----

    /// Queries both families' tether counters and writes the reply to
    /// `sink`. Nothing is written unless the whole query succeeds.
    #[instrument(skip(self, sink))]
    pub async fn get_tether_stats(
        &self,
        sink: &mut dyn ResponseSink,
        filter: &TetherFilter,
    ) -> NetdResult<()> {
        if let TetherFilter::Pair {
            int_iface,
            ext_iface,
        } = filter
        {
            validate_iface(int_iface)?;
            validate_iface(ext_iface)?;
        }

        let batch = build_tether_counters_batch();
        let mut dumps = Vec::with_capacity(2);
        for family in IptablesTarget::V4V6.families() {
            let dump = self
                .ipt
                .iptables_restore_output(*family, &batch)
                .await
                .map_err(|e| {
                    NetdError::tether_stats(format!("Failed to fetch {} tether counters: {}", family, e))
                })?;
            dumps.push((*family, dump));
        }

        let list = tether_stats::aggregate(filter, &dumps)?;
        for (code, msg) in tether_stats::render_response(filter, &list)? {
            sink.send_msg(code, &msg).await?;
        }
        Ok(())
    }
}
