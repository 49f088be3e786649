use rotor_config::TransferConfig;
use std::borrow::Cow;

/// Environment variable rclone reads `--rc-pass` from.
pub const RC_PASS_ENV: &str = "RCLONE_RC_PASS";

/// Arguments for one transfer run, credential not yet injected.
///
/// The RC flags are always added so the statistics endpoint we poll is the
/// one this process serves. The RC password stays off argv; see
/// [`RC_PASS_ENV`].
pub fn transfer_args(transfer: &TransferConfig) -> Vec<String> {
    let mut args = vec![
        transfer.subcommand.clone(),
        transfer.source.clone(),
        transfer.destination.clone(),
    ];
    args.extend(transfer.extra_args.iter().cloned());
    args.push("--rc".to_string());
    args.push(format!("--rc-addr={}:{}", transfer.rc_addr, transfer.rc_port));
    if let Some(user) = &transfer.rc_user {
        args.push(format!("--rc-user={user}"));
    }
    args
}

/// Render `binary args...` as one `sh -c` line with every word quoted.
pub fn shell_line(binary: &str, args: &[String]) -> String {
    std::iter::once(binary)
        .chain(args.iter().map(String::as_str))
        .map(|word| shell_escape::escape(Cow::Borrowed(word)).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_args_order() {
        let transfer = TransferConfig {
            source: "/home/tomove".to_string(),
            destination: "GDrive:/tmp".to_string(),
            ..Default::default()
        };
        assert_eq!(
            transfer_args(&transfer),
            vec![
                "move",
                "/home/tomove",
                "GDrive:/tmp",
                "--drive-server-side-across-configs",
                "-v",
                "--rc",
                "--rc-addr=127.0.0.1:5572",
            ]
        );
    }

    #[test]
    fn test_transfer_args_keep_rc_pass_off_argv() {
        let transfer = TransferConfig {
            rc_user: Some("u".to_string()),
            rc_pass: Some("p".to_string()),
            extra_args: vec![],
            ..Default::default()
        };
        let args = transfer_args(&transfer);
        assert_eq!(args.last().map(String::as_str), Some("--rc-user=u"));
        assert!(!args.iter().any(|a| a.contains("--rc-pass") || a == "p"));
    }

    #[test]
    fn test_shell_line_quotes_special_characters() {
        let line = shell_line(
            "rclone",
            &[
                "move".to_string(),
                "/data/my files".to_string(),
                "it's".to_string(),
            ],
        );
        assert!(line.starts_with("rclone move "));
        assert!(line.contains("'/data/my files'"));
        assert!(!line.contains(" it's"));
    }

    #[test]
    fn test_shell_line_plain_words_unquoted() {
        assert_eq!(
            shell_line("rclone", &["move".to_string(), "/a".to_string()]),
            "rclone move /a"
        );
    }
}
