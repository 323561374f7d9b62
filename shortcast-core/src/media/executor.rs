use std::path::Path;
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;

/// Seam between the toolkit and the ffmpeg/ffprobe processes, swapped out in
/// tests.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<Output>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandExecutor;

#[async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<Output> {
        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);
        command.output().await
    }
}
