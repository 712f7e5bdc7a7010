use std::sync::OnceLock;

static HOST_INFO: OnceLock<(String, String)> = OnceLock::new();

fn host_info() -> &'static (String, String) {
    HOST_INFO.get_or_init(detect)
}

#[cfg(target_os = "linux")]
fn detect() -> (String, String) {
    match nix::sys::utsname::uname() {
        Ok(utsname) => (
            utsname.sysname().to_string_lossy().into_owned(),
            utsname.release().to_string_lossy().into_owned(),
        ),
        Err(_) => ("Linux".to_string(), "version".to_string()),
    }
}

#[cfg(not(target_os = "linux"))]
fn detect() -> (String, String) {
    ("unix".to_string(), "version".to_string())
}

/// Operating-system name for the `SERVER`/`USER-AGENT` headers
///
/// Computed once per process on first use.
pub(crate) fn os_name() -> &'static str {
    &host_info().0
}

/// Operating-system version for the `SERVER`/`USER-AGENT` headers
pub(crate) fn os_version() -> &'static str {
    &host_info().1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_and_version_are_nonempty() {
        assert!(!os_name().is_empty());
        assert!(!os_version().is_empty());
    }

    #[test]
    fn repeated_calls_are_stable() {
        assert_eq!(os_name(), os_name());
        assert_eq!(os_version(), os_version());
    }
}
