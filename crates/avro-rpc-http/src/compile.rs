//! Compilation of IDL protocol files into JSON schema files.

use crate::error::Error;

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Default Java launcher.
pub const DEFAULT_JAVA: &str = "java";

/// Run `java -jar <tools_jar> idl <protocol> <schema>`.
///
/// Compiler output is forwarded to the log line by line.
///
/// # Errors
///
/// Fails if `protocol` does not exist, the compiler cannot be started, or
/// it exits unsuccessfully.
pub async fn compile_protocol(protocol: &Path, schema: &Path, tools_jar: &Path) -> Result<(), Error> {
    compile_protocol_with(OsStr::new(DEFAULT_JAVA), protocol, schema, tools_jar).await
}

/// As [`compile_protocol`], with an explicit Java launcher.
///
/// # Errors
///
/// See [`compile_protocol`].
pub async fn compile_protocol_with(
    java: &OsStr,
    protocol: &Path,
    schema: &Path,
    tools_jar: &Path,
) -> Result<(), Error> {
    if !protocol.exists() {
        return Err(Error::MissingFile(protocol.to_path_buf()));
    }

    debug!("Compiling {} into {}", protocol.display(), schema.display());

    let mut child = Command::new(java)
        .arg("-jar")
        .arg(tools_jar)
        .arg("idl")
        .arg(protocol)
        .arg(schema)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(Error::CompilerSpawn)?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (status, (), ()) = tokio::join!(
        child.wait(),
        forward_lines(stdout, false),
        forward_lines(stderr, true),
    );
    let status = status.map_err(Error::CompilerSpawn)?;

    if status.success() {
        info!("Compiled {}", protocol.display());
        Ok(())
    } else {
        error!("Protocol compiler exited with status: {}", status);
        Err(Error::CompilerFailed {
            protocol: protocol.to_path_buf(),
            status,
        })
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(stream: Option<R>, is_stderr: bool) {
    let Some(stream) = stream else {
        return;
    };

    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_stderr {
            warn!("avro-tools: {}", line);
        } else {
            info!("avro-tools: {}", line);
        }
    }
}
