//! Operation Drivers (C8): abstract the three families of side effect —
//! filesystem, subprocess, container runtime — each with a production
//! implementation and a
//! `Mock*` implementation that records calls instead of touching the
//! world, so the Executor can be tested without spawning real processes
//! or touching a real filesystem.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use cph_core::CphError;

/// Output of a completed subprocess invocation.
#[derive(Clone, Debug, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub return_code: i32,
}

fn fs_err(path: &Path, e: impl std::fmt::Display) -> CphError {
    CphError::DriverFilesystem {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

#[async_trait]
pub trait FilesystemDriver: Send + Sync {
    async fn create_dir(&self, path: &Path) -> Result<(), CphError>;
    async fn remove(&self, path: &Path) -> Result<(), CphError>;
    async fn copy(&self, src: &Path, dst: &Path) -> Result<(), CphError>;
    async fn move_path(&self, src: &Path, dst: &Path) -> Result<(), CphError>;
    async fn exists(&self, path: &Path) -> bool;
    async fn chmod(&self, path: &Path, mode: u32) -> Result<(), CphError>;
    async fn hash(&self, path: &Path) -> Result<String, CphError>;
    /// Create an empty file at `path`, creating parent directories as
    /// needed (Step kind TOUCH).
    async fn touch(&self, path: &Path) -> Result<(), CphError>;
}

/// Production filesystem driver: `tokio::fs` throughout.
pub struct RealFilesystemDriver;

#[async_trait]
impl FilesystemDriver for RealFilesystemDriver {
    async fn create_dir(&self, path: &Path) -> Result<(), CphError> {
        tracing::debug!(path = %path.display(), "create_dir");
        tokio::fs::create_dir_all(path).await.map_err(|e| fs_err(path, e))
    }

    async fn remove(&self, path: &Path) -> Result<(), CphError> {
        tracing::debug!(path = %path.display(), "remove");
        let meta = tokio::fs::metadata(path).await;
        match meta {
            Ok(m) if m.is_dir() => tokio::fs::remove_dir_all(path).await.map_err(|e| fs_err(path, e)),
            Ok(_) => tokio::fs::remove_file(path).await.map_err(|e| fs_err(path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(fs_err(path, e)),
        }
    }

    async fn copy(&self, src: &Path, dst: &Path) -> Result<(), CphError> {
        tracing::debug!(src = %src.display(), dst = %dst.display(), "copy");
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| fs_err(dst, e))?;
        }
        tokio::fs::copy(src, dst).await.map(|_| ()).map_err(|e| fs_err(src, e))
    }

    async fn move_path(&self, src: &Path, dst: &Path) -> Result<(), CphError> {
        tracing::debug!(src = %src.display(), dst = %dst.display(), "move");
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| fs_err(dst, e))?;
        }
        tokio::fs::rename(src, dst).await.map_err(|e| fs_err(src, e))
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }

    async fn chmod(&self, path: &Path, mode: u32) -> Result<(), CphError> {
        tracing::debug!(path = %path.display(), mode = format!("{mode:o}"), "chmod");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(mode);
            tokio::fs::set_permissions(path, perms).await.map_err(|e| fs_err(path, e))
        }
        #[cfg(not(unix))]
        {
            let _ = mode;
            Ok(())
        }
    }

    async fn hash(&self, path: &Path) -> Result<String, CphError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| fs_err(path, e))?;
        let digest = Sha256::digest(&bytes);
        Ok(format!("{digest:x}"))
    }

    async fn touch(&self, path: &Path) -> Result<(), CphError> {
        tracing::debug!(path = %path.display(), "touch");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| fs_err(path, e))?;
        }
        match tokio::fs::OpenOptions::new().create(true).write(true).open(path).await {
            Ok(_) => Ok(()),
            Err(e) => Err(fs_err(path, e)),
        }
    }
}

/// One recorded driver invocation, for test assertions.
pub type CallLog = Mutex<Vec<String>>;

#[derive(Default)]
pub struct MockFilesystemDriver {
    pub calls: CallLog,
    pub existing: Mutex<Vec<PathBuf>>,
}

impl MockFilesystemDriver {
    pub fn with_existing(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            existing: Mutex::new(paths.into_iter().collect()),
        }
    }
}

#[async_trait]
impl FilesystemDriver for MockFilesystemDriver {
    async fn create_dir(&self, path: &Path) -> Result<(), CphError> {
        self.calls.lock().unwrap().push(format!("create_dir {}", path.display()));
        self.existing.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<(), CphError> {
        self.calls.lock().unwrap().push(format!("remove {}", path.display()));
        self.existing.lock().unwrap().retain(|p| p != path);
        Ok(())
    }

    async fn copy(&self, src: &Path, dst: &Path) -> Result<(), CphError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("copy {} -> {}", src.display(), dst.display()));
        self.existing.lock().unwrap().push(dst.to_path_buf());
        Ok(())
    }

    async fn move_path(&self, src: &Path, dst: &Path) -> Result<(), CphError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("move {} -> {}", src.display(), dst.display()));
        let mut existing = self.existing.lock().unwrap();
        existing.retain(|p| p != src);
        existing.push(dst.to_path_buf());
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        self.existing.lock().unwrap().iter().any(|p| p == path)
    }

    async fn chmod(&self, path: &Path, mode: u32) -> Result<(), CphError> {
        self.calls.lock().unwrap().push(format!("chmod {} {mode:o}", path.display()));
        Ok(())
    }

    async fn hash(&self, path: &Path) -> Result<String, CphError> {
        self.calls.lock().unwrap().push(format!("hash {}", path.display()));
        Ok("mockhash".to_string())
    }

    async fn touch(&self, path: &Path) -> Result<(), CphError> {
        self.calls.lock().unwrap().push(format!("touch {}", path.display()));
        self.existing.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

#[async_trait]
pub trait SubprocessDriver: Send + Sync {
    /// Run `program` to completion, killing it after `timeout` elapses.
    /// Timeouts are mandatory; unbounded runs are
    /// InvalidConfiguration" — enforced by the caller always supplying one.
    async fn run_command(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> Result<CommandOutput, CphError>;

    async fn check_available(&self, program: &str) -> bool;
}

pub struct RealSubprocessDriver;

#[async_trait]
impl SubprocessDriver for RealSubprocessDriver {
    async fn run_command(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> Result<CommandOutput, CphError> {
        tracing::debug!(program, args = args.join(" "), "run_command");
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        cmd.kill_on_drop(true);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| CphError::DriverSubprocess {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                return_code: output.status.code().unwrap_or(-1),
            }),
            Ok(Err(e)) => Err(CphError::DriverSubprocess {
                program: program.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(CphError::DriverSubprocess {
                program: program.to_string(),
                reason: format!("timed out after {}s", timeout.as_secs()),
            }),
        }
    }

    async fn check_available(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

#[derive(Default)]
pub struct MockSubprocessDriver {
    pub calls: CallLog,
    pub responses: Mutex<Vec<CommandOutput>>,
}

#[async_trait]
impl SubprocessDriver for MockSubprocessDriver {
    async fn run_command(
        &self,
        program: &str,
        args: &[String],
        _cwd: Option<&Path>,
        _timeout: Duration,
    ) -> Result<CommandOutput, CphError> {
        self.calls.lock().unwrap().push(format!("{program} {}", args.join(" ")));
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_default())
    }

    async fn check_available(&self, _program: &str) -> bool {
        true
    }
}

/// Container naming rule:
/// `image_name = "{language}-{hash12(dockerfile_content)}"`.
pub fn image_name(language: &str, dockerfile_content: &str) -> String {
    let digest = Sha256::digest(dockerfile_content.as_bytes());
    let hash12: String = format!("{digest:x}").chars().take(12).collect();
    format!("{language}-{hash12}")
}

/// `container_name = "{image_name}-{uuid8}"`.
pub fn container_name(image_name: &str) -> String {
    let uuid8: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("{image_name}-{uuid8}")
}

#[async_trait]
pub trait ContainerDriver: Send + Sync {
    async fn image_build(&self, dockerfile_content: &str, image: &str) -> Result<(), CphError>;
    async fn image_pull(&self, image_ref: &str) -> Result<(), CphError>;
    async fn container_run(&self, image: &str, container: &str, command: &[String]) -> Result<CommandOutput, CphError>;
    async fn container_stop(&self, container: &str, grace_period: Duration) -> Result<(), CphError>;
    async fn container_remove(&self, container: &str) -> Result<(), CphError>;
    async fn container_ps(&self) -> Result<Vec<String>, CphError>;
}

/// Production driver: shells out to the configured container binary
/// (default `docker`).
pub struct RealContainerDriver {
    pub binary: String,
}

impl RealContainerDriver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    async fn run(&self, args: &[&str]) -> Result<CommandOutput, CphError> {
        tracing::debug!(binary = %self.binary, args = args.join(" "), "container driver invocation");
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(args);
        cmd.kill_on_drop(true);
        let output = cmd.output().await.map_err(|e| CphError::DriverContainer {
            op: args.first().unwrap_or(&"").to_string(),
            reason: e.to_string(),
        })?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            return_code: output.status.code().unwrap_or(-1),
        })
    }
}

#[async_trait]
impl ContainerDriver for RealContainerDriver {
    async fn image_build(&self, dockerfile_content: &str, image: &str) -> Result<(), CphError> {
        let tmp = tempfile::NamedTempFile::new().map_err(|e| CphError::DriverContainer {
            op: "image_build".to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(tmp.path(), dockerfile_content).map_err(|e| CphError::DriverContainer {
            op: "image_build".to_string(),
            reason: e.to_string(),
        })?;
        let path = tmp.path().to_string_lossy().to_string();
        let output = self.run(&["build", "-f", &path, "-t", image, "."]).await?;
        if output.return_code != 0 {
            return Err(CphError::DriverContainer {
                op: "image_build".to_string(),
                reason: output.stderr,
            });
        }
        Ok(())
    }

    async fn image_pull(&self, image_ref: &str) -> Result<(), CphError> {
        let output = self.run(&["pull", image_ref]).await?;
        if output.return_code != 0 {
            return Err(CphError::DriverContainer {
                op: "image_pull".to_string(),
                reason: output.stderr,
            });
        }
        Ok(())
    }

    async fn container_run(&self, image: &str, container: &str, command: &[String]) -> Result<CommandOutput, CphError> {
        let mut args: Vec<&str> = vec!["run", "--name", container, image];
        args.extend(command.iter().map(String::as_str));
        self.run(&args).await
    }

    async fn container_stop(&self, container: &str, grace_period: Duration) -> Result<(), CphError> {
        let secs = grace_period.as_secs().to_string();
        let output = self.run(&["stop", "-t", &secs, container]).await?;
        if output.return_code != 0 {
            return Err(CphError::DriverContainer {
                op: "container_stop".to_string(),
                reason: output.stderr,
            });
        }
        Ok(())
    }

    async fn container_remove(&self, container: &str) -> Result<(), CphError> {
        let output = self.run(&["rm", "-f", container]).await?;
        if output.return_code != 0 {
            return Err(CphError::DriverContainer {
                op: "container_remove".to_string(),
                reason: output.stderr,
            });
        }
        Ok(())
    }

    async fn container_ps(&self) -> Result<Vec<String>, CphError> {
        let output = self.run(&["ps", "--format", "{{.Names}}"]).await?;
        Ok(output.stdout.lines().map(str::to_string).collect())
    }
}

#[derive(Default)]
pub struct MockContainerDriver {
    pub calls: CallLog,
}

#[async_trait]
impl ContainerDriver for MockContainerDriver {
    async fn image_build(&self, _dockerfile_content: &str, image: &str) -> Result<(), CphError> {
        self.calls.lock().unwrap().push(format!("image_build {image}"));
        Ok(())
    }

    async fn image_pull(&self, image_ref: &str) -> Result<(), CphError> {
        self.calls.lock().unwrap().push(format!("image_pull {image_ref}"));
        Ok(())
    }

    async fn container_run(&self, image: &str, container: &str, _command: &[String]) -> Result<CommandOutput, CphError> {
        self.calls.lock().unwrap().push(format!("container_run {image} {container}"));
        Ok(CommandOutput::default())
    }

    async fn container_stop(&self, container: &str, _grace_period: Duration) -> Result<(), CphError> {
        self.calls.lock().unwrap().push(format!("container_stop {container}"));
        Ok(())
    }

    async fn container_remove(&self, container: &str) -> Result<(), CphError> {
        self.calls.lock().unwrap().push(format!("container_remove {container}"));
        Ok(())
    }

    async fn container_ps(&self) -> Result<Vec<String>, CphError> {
        Ok(Vec::new())
    }
}
