//! 命令与进程步骤

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tcr_executor::{ActionOutcome, StepAction, StepDetails};
use sysinfo::{Disks, Pid, Process, ProcessStatus, Signal, System};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::{params, ActionError, Result};

const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;
const STOP_WAIT_LIMIT: Duration = Duration::from_secs(5);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[cfg(windows)]
const DEFAULT_DISK_PATH: &str = "C:/";
#[cfg(not(windows))]
const DEFAULT_DISK_PATH: &str = "/";

/// 通过系统 shell 构造命令
fn shell_command(command_line: &str) -> Command {
    #[cfg(windows)]
    {
        let mut command = Command::new("cmd");
        command.arg("/C").arg(command_line);
        command
    }
    #[cfg(not(windows))]
    {
        let mut command = Command::new("sh");
        command.arg("-c").arg(command_line);
        command
    }
}

/// 执行 shell 命令
///
/// 参数: `command`, `timeout` (秒，默认 30，空值表示不限时)，`working_dir`。
/// 退出码为 0 时通过；输出为 STDOUT/STDERR 合并文本。
pub struct RunCommand;

#[async_trait]
impl StepAction for RunCommand {
    async fn execute(&self, details: &StepDetails) -> tcr_executor::Result<ActionOutcome> {
        let command_line = params::text(details, "command");
        if command_line.is_empty() {
            return Ok(ActionOutcome::fail("No command specified"));
        }

        // 空串或无法解析时不限时
        let timeout = match details.get("timeout") {
            None => Some(DEFAULT_COMMAND_TIMEOUT_SECS),
            Some(_) => params::number(details, "timeout", None),
        };

        let mut command = shell_command(&command_line);
        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = params::optional_text(details, "working_dir") {
            command.current_dir(dir);
        }

        debug!("执行命令: {} (超时: {:?})", command_line, timeout);

        let output = match timeout {
            Some(secs) => {
                match tokio::time::timeout(Duration::from_secs(secs), command.output()).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("命令超时: {}", command_line);
                        return Ok(ActionOutcome::fail(format!(
                            "Command timed out after {}s",
                            secs
                        ))
                        .with_output(""));
                    }
                }
            }
            None => command.output().await,
        };

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return Ok(
                    ActionOutcome::fail(format!("Command execution failed: {}", e)).with_output(""),
                )
            }
        };

        let text = format!(
            "STDOUT:\n{}\n\nSTDERR:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );

        Ok(match output.status.code() {
            Some(0) => ActionOutcome::pass("Command executed successfully (exit code: 0)")
                .with_output(text),
            Some(code) => {
                ActionOutcome::fail(format!("Command failed with exit code: {}", code))
                    .with_output(text)
            }
            None => ActionOutcome::fail("Command terminated by signal").with_output(text),
        })
    }
}

/// 启动进程
///
/// 参数: `executable`, `arguments`, `wait_var` (是否等待进程结束)
pub struct StartProcess;

#[async_trait]
impl StepAction for StartProcess {
    async fn execute(&self, details: &StepDetails) -> tcr_executor::Result<ActionOutcome> {
        let executable = params::text(details, "executable");
        let arguments = params::text(details, "arguments");
        let wait = params::flag(details, "wait_var", false);

        if executable.is_empty() || !Path::new(&executable).exists() {
            return Ok(ActionOutcome::fail(format!(
                "Executable not found: {}",
                executable
            )));
        }

        let mut command = shell_command(&format!("\"{}\" {}", executable, arguments));

        if wait {
            return Ok(match command.status().await {
                Ok(status) => ActionOutcome::pass(format!(
                    "Process completed with exit code: {}",
                    status.code().unwrap_or(-1)
                )),
                Err(e) => ActionOutcome::fail(format!("Start process failed: {}", e)),
            });
        }

        Ok(match command.spawn() {
            Ok(child) => {
                info!("进程已启动: {} (pid: {:?})", executable, child.id());
                ActionOutcome::pass(format!("Process started: {}", executable))
            }
            Err(e) => ActionOutcome::fail(format!("Start process failed: {}", e)),
        })
    }
}

/// 在阻塞线程池中执行系统查询
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ActionError::TaskFailed(e.to_string()))
}

/// 读取 `pid` 参数，空值视为未设置
fn pid_param(details: &StepDetails) -> Result<Option<u32>> {
    let raw = params::text(details, "pid");
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| ActionError::InvalidParameter(format!("pid: {}", raw)))
}

/// 进程名比较不区分大小写
fn name_matches(process: &Process, name: &str) -> bool {
    process.name().to_lowercase() == name
}

/// 进程已退出或只剩僵尸进程
fn has_exited(system: &mut System, pid: Pid) -> bool {
    if !system.refresh_process(pid) {
        return true;
    }
    system.process(pid).map_or(true, |process| {
        matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
    })
}

/// 发送终止信号；平台不支持 SIGTERM 时直接 kill
fn send_stop(process: &Process, force: bool) -> bool {
    if force {
        process.kill()
    } else {
        process
            .kill_with(Signal::Term)
            .unwrap_or_else(|| process.kill())
    }
}

fn running_pids(pid: Option<u32>, name: &str) -> Vec<u32> {
    let mut system = System::new();
    match pid {
        Some(raw) => {
            if has_exited(&mut system, Pid::from_u32(raw)) {
                Vec::new()
            } else {
                vec![raw]
            }
        }
        None => {
            system.refresh_processes();
            let mut pids: Vec<u32> = system
                .processes()
                .values()
                .filter(|process| name_matches(process, name))
                .map(|process| process.pid().as_u32())
                .collect();
            pids.sort_unstable();
            pids
        }
    }
}

fn stop_by_pid(raw: u32, force: bool) -> ActionOutcome {
    let pid = Pid::from_u32(raw);
    let mut system = System::new();

    if has_exited(&mut system, pid) {
        return ActionOutcome::fail(format!("Process not found (PID: {})", raw));
    }
    let signalled = system
        .process(pid)
        .map_or(false, |process| send_stop(process, force));
    if !signalled {
        return ActionOutcome::fail(format!(
            "Stop process failed: could not signal PID {}",
            raw
        ));
    }

    let deadline = std::time::Instant::now() + STOP_WAIT_LIMIT;
    while !has_exited(&mut system, pid) {
        if std::time::Instant::now() >= deadline {
            return ActionOutcome::fail(format!(
                "Stop process failed: PID {} still running after {}s",
                raw,
                STOP_WAIT_LIMIT.as_secs()
            ));
        }
        std::thread::sleep(STOP_POLL_INTERVAL);
    }

    ActionOutcome::pass(format!("Process stopped (PID: {})", raw))
}

fn stop_by_name(name: &str, force: bool) -> ActionOutcome {
    let mut system = System::new();
    system.refresh_processes();

    let stopped = system
        .processes()
        .values()
        .filter(|process| name_matches(process, name))
        .filter(|process| send_stop(process, force))
        .count();

    if stopped > 0 {
        ActionOutcome::pass(format!(
            "Stopped {} process(es) named '{}'",
            stopped, name
        ))
    } else {
        ActionOutcome::fail(format!(
            "No running process found with name '{}'",
            name
        ))
    }
}

/// 结束进程
///
/// 参数: `process_name` 或 `pid` (优先)，`force_var` (强制 kill)。
/// 按 PID 结束时最多等待 5 秒确认退出。
pub struct StopProcess;

impl StopProcess {
    async fn run(&self, details: &StepDetails) -> Result<ActionOutcome> {
        let name = params::text(details, "process_name").to_lowercase();
        let pid = pid_param(details)?;
        let force = params::flag(details, "force_var", false);

        if name.is_empty() && pid.is_none() {
            return Ok(ActionOutcome::fail(
                "Either process_name or pid must be provided",
            ));
        }

        debug!("结束进程: name={:?}, pid={:?}, force={}", name, pid, force);

        let outcome = blocking(move || match pid {
            Some(pid) => stop_by_pid(pid, force),
            None => stop_by_name(&name, force),
        })
        .await?;

        if outcome.passed {
            info!("{}", outcome.message);
        }
        Ok(outcome)
    }
}

#[async_trait]
impl StepAction for StopProcess {
    async fn execute(&self, details: &StepDetails) -> tcr_executor::Result<ActionOutcome> {
        Ok(self.run(details).await?)
    }
}

/// 检查进程是否在运行
///
/// 参数: `process_name` 或 `pid`，`should_run` (`Yes` / `No`，默认 `Yes`)
pub struct CheckProcessRunning;

impl CheckProcessRunning {
    async fn run(&self, details: &StepDetails) -> Result<ActionOutcome> {
        let name = params::text(details, "process_name").to_lowercase();
        let pid = pid_param(details)?;
        let should_run = params::optional_text(details, "should_run").map_or(true, |v| v == "Yes");

        if name.is_empty() && pid.is_none() {
            return Ok(ActionOutcome::fail(
                "Either process_name or pid must be provided",
            ));
        }

        let pids = blocking(move || running_pids(pid, &name)).await?;
        let running = !pids.is_empty();

        Ok(match (should_run, running) {
            (true, true) => ActionOutcome::pass(format!("Process is running (PIDs: {:?})", pids)),
            (true, false) => ActionOutcome::fail("Process is not running"),
            (false, false) => ActionOutcome::pass("Process is not running (as expected)"),
            (false, true) => {
                ActionOutcome::fail(format!("Process is still running (PIDs: {:?})", pids))
            }
        })
    }
}

#[async_trait]
impl StepAction for CheckProcessRunning {
    async fn execute(&self, details: &StepDetails) -> tcr_executor::Result<ActionOutcome> {
        Ok(self.run(details).await?)
    }
}

/// 检查磁盘剩余空间
///
/// 参数: `path` (默认系统盘)，`required_gb` (空值或 0 时只报告用量)。
/// 取挂载点为路径最长前缀的磁盘。
pub struct CheckDiskSpace;

impl CheckDiskSpace {
    async fn run(&self, details: &StepDetails) -> Result<ActionOutcome> {
        let path = params::optional_text(details, "path")
            .unwrap_or_else(|| DEFAULT_DISK_PATH.to_string());
        let required_gb = params::decimal(details, "required_gb").filter(|gb| *gb > 0.0);

        let canonical = match tokio::fs::canonicalize(&path).await {
            Ok(canonical) => canonical,
            Err(_) => return Ok(ActionOutcome::fail(format!("Path does not exist: {}", path))),
        };

        let usage = blocking(move || {
            let disks = Disks::new_with_refreshed_list();
            disks
                .list()
                .iter()
                .filter(|disk| canonical.starts_with(disk.mount_point()))
                .max_by_key(|disk| disk.mount_point().as_os_str().len())
                .map(|disk| (disk.total_space(), disk.available_space()))
        })
        .await?;

        let Some((total, free)) = usage else {
            return Ok(ActionOutcome::fail(format!(
                "Check disk space failed: no mounted disk found for {}",
                path
            )));
        };

        let total_gb = total as f64 / BYTES_PER_GB;
        let free_gb = free as f64 / BYTES_PER_GB;
        let used_gb = total.saturating_sub(free) as f64 / BYTES_PER_GB;
        let free_percent = if total > 0 {
            free as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        let info = format!(
            "Disk: {:.2}GB total, {:.2}GB used, {:.2}GB free ({:.1}%)",
            total_gb, used_gb, free_gb, free_percent
        );

        Ok(match required_gb {
            Some(required) if free_gb >= required => ActionOutcome::pass(format!(
                "✓ Sufficient space: {:.2}GB available (required: {}GB). {}",
                free_gb, required, info
            )),
            Some(required) => ActionOutcome::fail(format!(
                "✗ Insufficient space: {:.2}GB available (required: {}GB). {}",
                free_gb, required, info
            )),
            None => ActionOutcome::pass(info),
        })
    }
}

#[async_trait]
impl StepAction for CheckDiskSpace {
    async fn execute(&self, details: &StepDetails) -> tcr_executor::Result<ActionOutcome> {
        Ok(self.run(details).await?)
    }
}

/// 检查可用内存
///
/// 参数: `required_mb` (空值或 0 时只报告用量)
pub struct CheckMemory;

impl CheckMemory {
    async fn run(&self, details: &StepDetails) -> Result<ActionOutcome> {
        let required_mb = params::decimal(details, "required_mb").filter(|mb| *mb > 0.0);

        let (total, available, used) = blocking(|| {
            let mut system = System::new();
            system.refresh_memory();
            (
                system.total_memory(),
                system.available_memory(),
                system.used_memory(),
            )
        })
        .await?;

        let total_mb = total as f64 / BYTES_PER_MB;
        let available_mb = available as f64 / BYTES_PER_MB;
        let used_mb = used as f64 / BYTES_PER_MB;
        let percent_available = if total > 0 {
            available as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        let info = format!(
            "Memory: {:.0}MB total, {:.0}MB used, {:.0}MB available ({:.1}% free)",
            total_mb, used_mb, available_mb, percent_available
        );

        Ok(match required_mb {
            Some(required) if available_mb >= required => ActionOutcome::pass(format!(
                "✓ Sufficient memory: {:.0}MB available (required: {}MB). {}",
                available_mb, required, info
            )),
            Some(required) => ActionOutcome::fail(format!(
                "✗ Insufficient memory: {:.0}MB available (required: {}MB). {}",
                available_mb, required, info
            )),
            None => ActionOutcome::pass(info),
        })
    }
}

#[async_trait]
impl StepAction for CheckMemory {
    async fn execute(&self, details: &StepDetails) -> tcr_executor::Result<ActionOutcome> {
        Ok(self.run(details).await?)
    }
}
