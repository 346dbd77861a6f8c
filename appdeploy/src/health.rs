//! One-shot health probe used by the upgrade state machine. Grounded on
//! `appdeploy_health_check` in `original_source/appdeploy.py`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::executor::{ExecOptions, TargetExecutor};
use crate::layout::Layout;
use crate::output::Output;
use crate::error::Result;
use crate::target::Target;

/// If `run/check.sh` or `run/check` exists, poll it every 2s until it
/// exits zero or `timeout` elapses. Otherwise, just confirm the process
/// is still alive (via `.pid`) after a `grace` period.
pub fn health_check(
    executor: &Arc<dyn TargetExecutor>,
    target: &Target,
    layout: &Layout,
    timeout: Duration,
    grace: Duration,
) -> Result<bool> {
    let run_dir = layout.run_dir();
    let check_script = format!("{run_dir}/check.sh");
    let check_script_alt = format!("{run_dir}/check");

    let has_sh = executor.exists(target, &check_script)?;
    let has_alt = !has_sh && executor.exists(target, &check_script_alt)?;

    if has_sh || has_alt {
        let check_cmd = if has_sh { check_script } else { check_script_alt };
        let deadline = Instant::now() + timeout;

        while Instant::now() < deadline {
            let result = executor.run(
                target,
                &format!("cd {} && {}", shlex::quote(&run_dir), shlex::quote(&check_cmd)),
                &ExecOptions::no_check().with_timeout(Duration::from_secs(10)),
            )?;
            if result.ok() {
                Output::verbose("Health check passed");
                return Ok(true);
            }
            Output::verbose("Health check failed, retrying...");
            std::thread::sleep(Duration::from_secs(2));
        }

        Output::error("Health check timed out");
        Ok(false)
    } else {
        Output::verbose(&format!("No check script, waiting {}s grace period...", grace.as_secs()));
        std::thread::sleep(grace);

        let pid_file = format!("{run_dir}/.pid");
        if !executor.exists(target, &pid_file)? {
            Output::error("Process died during grace period");
            return Ok(false);
        }

        Output::verbose("Process still running after grace period");
        Ok(true)
    }
}
