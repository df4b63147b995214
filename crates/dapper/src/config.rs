//! Resolves raw `launch`/`attach` request arguments into a normalized
//! configuration the backend and session layers consume, validating
//! mutually exclusive fields up front instead of letting each consumer
//! re-check them.

use crate::error::DapperError;
use crate::protocol::{AttachRequestArguments, LaunchRequestArguments};
use crate::transport::Endpoint;
use std::collections::HashMap;
use std::path::PathBuf;

/// How the adapter should reach an external launcher process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcTransportChoice {
    Tcp,
    #[cfg(unix)]
    UnixSocket,
    #[cfg(windows)]
    NamedPipe,
    Auto,
}

impl IpcTransportChoice {
    fn parse(value: &str) -> Result<Self, DapperError> {
        match value {
            "tcp" => Ok(IpcTransportChoice::Tcp),
            #[cfg(unix)]
            "unix" => Ok(IpcTransportChoice::UnixSocket),
            #[cfg(windows)]
            "namedPipe" => Ok(IpcTransportChoice::NamedPipe),
            "auto" => Ok(IpcTransportChoice::Auto),
            other => Err(DapperError::Protocol(format!("unknown ipcTransport '{other}'"))),
        }
    }
}

/// Whether the debuggee runs in-process or as a launched/attached subprocess
/// fronted by an external launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendChoice {
    InProcess,
    ExternalLauncher,
}

/// Normalized configuration for a `launch` request.
#[derive(Debug, Clone)]
pub struct ResolvedLaunchConfig {
    pub target: LaunchTarget,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub stop_on_entry: bool,
    pub no_debug: bool,
    pub just_my_code: bool,
    pub backend: BackendChoice,
    pub ipc_transport: IpcTransportChoice,
    pub ipc_endpoint_hint: Option<Endpoint>,
    pub subprocess_auto_attach: bool,
    pub module_search_paths: Vec<String>,
    pub venv_path: Option<PathBuf>,
    pub strict_expression_watch_policy: bool,
}

/// A launch target is either a runnable program path or a module name
/// resolved by the backend's own search rules. Exactly one must be set.
#[derive(Debug, Clone)]
pub enum LaunchTarget {
    Program(String),
    Module(String),
}

pub fn resolve_launch(args: LaunchRequestArguments) -> Result<ResolvedLaunchConfig, DapperError> {
    let target = match (args.program, args.module) {
        (Some(program), None) => LaunchTarget::Program(program),
        (None, Some(module)) => LaunchTarget::Module(module),
        (Some(_), Some(_)) => {
            return Err(DapperError::Protocol("launch arguments must set program xor module, not both".into()))
        }
        (None, None) => {
            return Err(DapperError::Protocol("launch arguments must set either program or module".into()))
        }
    };

    let in_process = args.in_process.unwrap_or(false);
    let backend = if in_process { BackendChoice::InProcess } else { BackendChoice::ExternalLauncher };

    let ipc_transport = match args.ipc_transport {
        Some(value) => IpcTransportChoice::parse(&value)?,
        None => IpcTransportChoice::Auto,
    };

    let ipc_endpoint_hint = explicit_endpoint_hint(
        &ipc_transport,
        args.ipc_host.as_deref(),
        args.ipc_port,
        args.ipc_path.as_deref(),
        args.ipc_pipe_name.as_deref(),
    )?;

    Ok(ResolvedLaunchConfig {
        target,
        args: args.args.unwrap_or_default(),
        cwd: args.cwd.map(PathBuf::from),
        env: args.env.unwrap_or_default(),
        stop_on_entry: args.stop_on_entry.unwrap_or(false),
        no_debug: args.no_debug.unwrap_or(false),
        just_my_code: args.just_my_code.unwrap_or(true),
        backend,
        ipc_transport,
        ipc_endpoint_hint,
        subprocess_auto_attach: args.subprocess_auto_attach.unwrap_or(false),
        module_search_paths: args.module_search_paths.unwrap_or_default(),
        venv_path: args.venv_path.map(PathBuf::from),
        strict_expression_watch_policy: args.strict_expression_watch_policy.unwrap_or(false),
    })
}

/// Normalized configuration for an `attach` request.
#[derive(Debug, Clone)]
pub struct ResolvedAttachConfig {
    pub process_id: Option<u32>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub timeout: std::time::Duration,
    pub backend: BackendChoice,
    pub ipc_transport: IpcTransportChoice,
    pub ipc_endpoint_hint: Option<Endpoint>,
    pub subprocess_auto_attach: bool,
}

pub fn resolve_attach(args: AttachRequestArguments) -> Result<ResolvedAttachConfig, DapperError> {
    if args.process_id.is_none() && args.host.is_none() {
        return Err(DapperError::Protocol("attach arguments must set processId or host/port".into()));
    }

    let in_process = args.in_process.unwrap_or(false);
    let backend = if in_process { BackendChoice::InProcess } else { BackendChoice::ExternalLauncher };

    let ipc_transport = match args.ipc_transport {
        Some(value) => IpcTransportChoice::parse(&value)?,
        None => IpcTransportChoice::Auto,
    };

    let ipc_endpoint_hint = explicit_endpoint_hint(
        &ipc_transport,
        args.ipc_host.as_deref(),
        args.ipc_port,
        args.ipc_path.as_deref(),
        args.ipc_pipe_name.as_deref(),
    )?;

    Ok(ResolvedAttachConfig {
        process_id: args.process_id,
        host: args.host,
        port: args.port,
        timeout: std::time::Duration::from_millis(u64::from(args.timeout.unwrap_or(5000))),
        backend,
        ipc_transport,
        ipc_endpoint_hint,
        subprocess_auto_attach: args.subprocess_auto_attach.unwrap_or(false),
    })
}

fn explicit_endpoint_hint(
    transport: &IpcTransportChoice,
    ipc_host: Option<&str>,
    ipc_port: Option<u16>,
    ipc_path: Option<&str>,
    ipc_pipe_name: Option<&str>,
) -> Result<Option<Endpoint>, DapperError> {
    match transport {
        IpcTransportChoice::Tcp => match (ipc_host, ipc_port) {
            (Some(host), Some(port)) => Ok(Some(Endpoint::Tcp { host: host.to_string(), port })),
            (None, None) => Ok(None),
            _ => Err(DapperError::Protocol("tcp ipcTransport requires both ipcHost and ipcPort".into())),
        },
        #[cfg(unix)]
        IpcTransportChoice::UnixSocket => Ok(ipc_path.map(|p| Endpoint::UnixSocket { path: PathBuf::from(p) })),
        #[cfg(windows)]
        IpcTransportChoice::NamedPipe => {
            Ok(ipc_pipe_name.map(|name| Endpoint::NamedPipe { name: name.to_string() }))
        }
        IpcTransportChoice::Auto => {
            let _ = (ipc_path, ipc_pipe_name);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_launch() -> LaunchRequestArguments {
        LaunchRequestArguments {
            program: Some("app.py".to_string()),
            module: None,
            args: None,
            cwd: None,
            env: None,
            stop_on_entry: None,
            no_debug: None,
            just_my_code: None,
            in_process: None,
            use_ipc: None,
            ipc_transport: None,
            ipc_host: None,
            ipc_port: None,
            ipc_path: None,
            ipc_pipe_name: None,
            subprocess_auto_attach: None,
            module_search_paths: None,
            venv_path: None,
            strict_expression_watch_policy: None,
        }
    }

    #[test]
    fn rejects_program_and_module_together() {
        let mut args = base_launch();
        args.module = Some("pkg.main".to_string());
        assert!(resolve_launch(args).is_err());
    }

    #[test]
    fn rejects_neither_program_nor_module() {
        let mut args = base_launch();
        args.program = None;
        assert!(resolve_launch(args).is_err());
    }

    #[test]
    fn defaults_to_external_launcher_backend() {
        let resolved = resolve_launch(base_launch()).unwrap();
        assert_eq!(resolved.backend, BackendChoice::ExternalLauncher);
        assert!(!resolved.stop_on_entry);
        assert!(resolved.just_my_code);
    }

    #[test]
    fn in_process_flag_selects_in_process_backend() {
        let mut args = base_launch();
        args.in_process = Some(true);
        let resolved = resolve_launch(args).unwrap();
        assert_eq!(resolved.backend, BackendChoice::InProcess);
    }

    #[test]
    fn tcp_transport_requires_both_host_and_port() {
        let mut args = base_launch();
        args.ipc_transport = Some("tcp".to_string());
        args.ipc_host = Some("127.0.0.1".to_string());
        assert!(resolve_launch(args).is_err());
    }

    #[test]
    fn attach_requires_process_id_or_host() {
        let args = AttachRequestArguments {
            process_id: None,
            host: None,
            port: None,
            timeout: None,
            in_process: None,
            use_ipc: None,
            ipc_transport: None,
            ipc_host: None,
            ipc_port: None,
            ipc_path: None,
            ipc_pipe_name: None,
            subprocess_auto_attach: None,
        };
        assert!(resolve_attach(args).is_err());
    }
}
