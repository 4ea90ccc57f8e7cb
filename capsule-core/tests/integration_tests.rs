use capsule_core::*;

#[test]
fn test_program_info_current() {
    let info = ProgramInfo::current();

    assert_eq!(info.name(), "Capsule");
    assert_eq!(info.version(), env!("CARGO_PKG_VERSION"));
    assert_eq!(info.shell(), std::path::Path::new("/bin/sh"));
}

#[test]
fn test_program_info_banner() {
    let info = ProgramInfo::new("Box", "1.2.3", "/bin/bash");
    assert_eq!(info.banner(), "Box v1.2.3");
}

#[test]
fn test_configuration_error_display() {
    let err = Error::configuration("option -pid requires -mnt");

    assert!(err.is_configuration());
    assert_eq!(
        err.to_string(),
        "Configuration error: option -pid requires -mnt"
    );
}

#[test]
fn test_setup_error_display() {
    let err = Error::setup("uts", "sethostname failed");

    assert!(!err.is_configuration());
    assert_eq!(err.to_string(), "Setup error in uts: sethostname failed");
}

#[test]
fn test_launch_error_display() {
    let err = Error::launch("clone failed: EPERM");

    assert!(matches!(err, Error::Launch { .. }));
    assert_eq!(err.to_string(), "Launch error: clone failed: EPERM");
}

#[test]
fn test_nix_error_conversion() {
    let err: Error = nix::Error::EPERM.into();
    assert!(matches!(err, Error::System(_)));
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: Error = io.into();
    assert!(err.to_string().contains("missing"));
}
