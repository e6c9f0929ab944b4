//! Remote shell command construction.
//!
//! Everything that crosses into the remote shell goes through POSIX single
//! quoting, so local paths and arguments with spaces or metacharacters reach
//! the remote command unchanged.

use std::borrow::Cow;

/// Quote one word for a POSIX shell.
pub fn quote(word: &str) -> Cow<'_, str> {
    shell_words::quote(word)
}

/// `mkdir -p <dir> && cd <dir> && <args...>` with every piece quoted.
pub fn in_directory<S: AsRef<str>>(remote_dir: &str, args: &[S]) -> String {
    let dir = quote(remote_dir);
    let command = shell_words::join(args.iter().map(AsRef::as_ref));
    format!("mkdir -p {dir} && cd {dir} && {command}")
}

/// `printenv NAME`, quoted.
pub fn printenv(name: &str) -> String {
    format!("printenv {}", quote(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_words_pass_through() {
        assert_eq!(
            in_directory("/config/workspace/app", &["npm", "test"]),
            "mkdir -p /config/workspace/app && cd /config/workspace/app && npm test"
        );
    }

    #[test]
    fn test_spaces_and_metacharacters_are_quoted() {
        let cmd = in_directory("/config/workspace/my app", &["echo", "a b", "$HOME;rm"]);
        assert_eq!(
            cmd,
            "mkdir -p '/config/workspace/my app' && cd '/config/workspace/my app' && echo 'a b' '$HOME;rm'"
        );
    }

    #[test]
    fn test_single_quote_inside_word() {
        let args = vec!["echo".to_string(), "it's".to_string()];
        let cmd = in_directory("/w", &args);
        assert!(cmd.ends_with("echo 'it'\\''s'"), "{cmd}");
    }

    #[test]
    fn test_printenv() {
        assert_eq!(printenv("HAVEN_IDLE_TIMEOUT"), "printenv HAVEN_IDLE_TIMEOUT");
    }
}
