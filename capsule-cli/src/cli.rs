//! CLI argument definitions

use std::ffi::OsString;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use capsule_namespace::CapabilityRequest;

#[derive(Parser, Debug)]
#[command(name = "capsule")]
#[command(about = "Run an interactive shell inside new Linux namespaces", long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Start a shell in the selected namespaces
    #[arg(long)]
    pub run: bool,

    /// Namespace setup inside the re-executed child (internal)
    #[arg(long, hide = true)]
    pub ns: bool,

    /// Root filesystem to enter (enables the mount namespace)
    #[arg(long, value_name = "PATH")]
    pub mnt: Option<PathBuf>,

    /// Enable UTS namespace
    #[arg(long)]
    pub uts: bool,

    /// Hostname inside the UTS namespace
    #[arg(long, value_name = "NAME")]
    pub hostname: Option<String>,

    /// Enable IPC namespace
    #[arg(long)]
    pub ipc: bool,

    /// Enable network namespace
    #[arg(long)]
    pub net: bool,

    /// Enable PID namespace (requires --mnt)
    #[arg(long)]
    pub pid: bool,

    /// Enable user namespace
    #[arg(long)]
    pub uid: bool,

    /// Print name and version
    #[arg(short = 'v')]
    pub version: bool,
}

/// Which side of the re-exec we are on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Compute the namespaces and re-exec
    Run,
    /// Already inside the namespaces: set up and start the shell
    Namespace,
}

impl Cli {
    /// Parse an argument vector that may use single-dash long flags
    pub fn parse_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = OsString>,
    {
        Self::parse_from(normalize_args(args))
    }

    /// Selected mode; exactly one of `-run` and `-ns` must be given
    pub fn mode(&self) -> Result<Mode> {
        match (self.run, self.ns) {
            (true, false) => Ok(Mode::Run),
            (false, true) => Ok(Mode::Namespace),
            (true, true) => anyhow::bail!("-run and -ns cannot be used together"),
            (false, false) => anyhow::bail!(
                "Wrong arguments passed. Usage: capsule -run -uid [-mnt=/path/rootfs] \
                 [-uts [-hostname=new_hostname]] [-ipc] [-net] [-pid]"
            ),
        }
    }

    pub fn to_request(&self) -> CapabilityRequest {
        CapabilityRequest {
            mount_root: self
                .mnt
                .clone()
                .filter(|root| !root.as_os_str().is_empty()),
            uts: self.uts,
            hostname: self.hostname.clone(),
            ipc: self.ipc,
            network: self.net,
            process_id: self.pid,
            user_id: self.uid,
        }
    }
}

/// Rewrite `-flag` and `-flag=value` into clap's `--flag` form.
///
/// Single-letter flags such as `-v`, the program name and anything that is
/// not a flag are left alone. Arguments need not be valid UTF-8.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .enumerate()
        .map(|(i, arg)| {
            if i > 0 && is_single_dash_long(arg.as_bytes()) {
                let mut long = OsString::from("-");
                long.push(&arg);
                long
            } else {
                arg
            }
        })
        .collect()
}

fn is_single_dash_long(arg: &[u8]) -> bool {
    match arg.strip_prefix(b"-") {
        Some(rest) if !rest.starts_with(b"-") => {
            let name = rest.split(|&b| b == b'=').next().unwrap_or_default();
            name.len() > 1
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        std::iter::once("capsule")
            .chain(list.iter().copied())
            .map(OsString::from)
            .collect()
    }

    #[test]
    fn test_normalize_single_dash_flags() {
        let normalized = normalize_args(args(&["-run", "-mnt=/tmp/rootfs", "-v", "--pid", "/x"]));
        assert_eq!(
            normalized,
            args(&["--run", "--mnt=/tmp/rootfs", "-v", "--pid", "/x"])
        );
    }

    #[test]
    fn test_normalize_keeps_program_name() {
        let normalized = normalize_args(vec![OsString::from("-weird-argv0")]);
        assert_eq!(normalized, vec!["-weird-argv0"]);
    }

    #[test]
    fn test_normalize_non_utf8_flag() {
        use std::ffi::OsStr;

        let mount = OsStr::from_bytes(b"-mnt=/tmp/root\xff").to_os_string();
        let normalized = normalize_args(vec![OsString::from("capsule"), mount]);

        assert_eq!(normalized[1].as_bytes(), b"--mnt=/tmp/root\xff");
    }

    #[test]
    fn test_parse_non_utf8_mount_root() {
        use std::ffi::OsStr;

        let mut argv = args(&["-ns"]);
        argv.push(OsStr::from_bytes(b"-mnt=/tmp/root\xff").to_os_string());
        let cli = Cli::parse_args(argv);

        let root = cli.to_request().mount_root.unwrap();
        assert_eq!(root.as_os_str().as_bytes(), b"/tmp/root\xff");
    }

    #[test]
    fn test_parse_run_mode() {
        let cli = Cli::parse_args(args(&["-run", "-uid", "-mnt=/tmp/rootfs", "-pid"]));

        assert_eq!(cli.mode().unwrap(), Mode::Run);
        let request = cli.to_request();
        assert_eq!(request.mount_root(), Some(std::path::Path::new("/tmp/rootfs")));
        assert!(request.user_id);
        assert!(request.process_id);
        assert!(!request.uts);
    }

    #[test]
    fn test_parse_namespace_mode() {
        let cli = Cli::parse_args(args(&["-ns", "-uts", "-hostname=testbox"]));

        assert_eq!(cli.mode().unwrap(), Mode::Namespace);
        let request = cli.to_request();
        assert!(request.uts);
        assert_eq!(request.hostname.as_deref(), Some("testbox"));
    }

    #[test]
    fn test_modes_are_exclusive() {
        let cli = Cli::parse_args(args(&["-run", "-ns"]));
        let err = cli.mode().unwrap_err();
        assert!(err.to_string().contains("cannot be used together"));
    }

    #[test]
    fn test_no_mode() {
        let cli = Cli::parse_args(args(&["-ipc"]));
        let err = cli.mode().unwrap_err();
        assert!(err.to_string().contains("Wrong arguments passed"));
    }

    #[test]
    fn test_empty_mount_is_no_mount() {
        let cli = Cli::parse_args(args(&["-run", "-mnt="]));
        assert_eq!(cli.to_request().mount_root, None);
    }

    #[test]
    fn test_version_flag() {
        let cli = Cli::parse_args(args(&["-v"]));
        assert!(cli.version);
        assert!(cli.mode().is_err());
    }
}
