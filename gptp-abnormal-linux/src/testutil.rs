use std::path::{Path, PathBuf};

use crate::daemon::DaemonOptions;

/// A fresh directory for the config files of one test
pub(crate) fn workdir(test_name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "gptp-abnormal-{}-{test_name}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).expect("cannot create test directory");
    dir
}

/// Launch options that run `script` in a shell instead of gptp2d
///
/// The shell sees the daemon arguments as `$@`, starting with the program
/// name `gptp2d`.
pub(crate) fn fake_daemon(workdir: &Path, script: &str, base_port: u16) -> DaemonOptions {
    DaemonOptions {
        program: PathBuf::from("gptp2d"),
        launcher: vec![
            "/bin/sh".to_owned(),
            "-c".to_owned(),
            script.to_owned(),
            "fake-gptp2d".to_owned(),
        ],
        log_selector: None,
        workdir: workdir.to_owned(),
        base_port,
    }
}
