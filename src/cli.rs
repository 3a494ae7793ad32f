//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use fetchbind::Duration;
use fetchbind::request::DEFAULT_MAX_ATTEMPTS;

/// Fetch a URL, decode it and optionally bind its HTML into JSON.
///
/// Without `--rules` or `--select` the decoded body is printed. With
/// `--output` it is saved to a file instead.
#[derive(Parser, Debug)]
#[command(name = "fetchbind")]
#[command(author, version, about)]
pub struct Args {
    /// URL to request
    pub url: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Extra request header, "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
    pub headers: Vec<String>,

    /// Query string appended to the URL (already encoded)
    #[arg(long)]
    pub query: Option<String>,

    /// Form field sent URL-encoded, "key=value" (repeatable)
    #[arg(short = 'F', long = "form", value_name = "KEY=VALUE")]
    pub form: Vec<String>,

    /// Cookie sent with the request, "name=value" (repeatable)
    #[arg(short = 'b', long = "cookie", value_name = "NAME=VALUE")]
    pub cookies: Vec<String>,

    /// Send browser-like Accept headers and retry like a browser
    #[arg(long)]
    pub browser: bool,

    /// Binding rules file (JSON or YAML): one rule, or a list of fields
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// CSS selector of the root node(s) to bind or print
    #[arg(long)]
    pub select: Option<String>,

    /// Template parameter for rule values, "key=value" (repeatable)
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Charset of the body, or "auto" to use Content-Type
    #[arg(long, default_value = "auto")]
    pub charset: String,

    /// Maximum retries for transient failures (0-10)
    #[arg(short = 'r', long, default_value_t = (DEFAULT_MAX_ATTEMPTS - 1) as u8, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub retries: u8,

    /// Give up after this long, e.g. "30s" or "1m30s"
    #[arg(short = 't', long)]
    pub timeout: Option<Duration>,

    /// Save the body to this path instead of printing it
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Replace an existing output file
    #[arg(long)]
    pub overwrite: bool,

    /// Write the response status line and headers to stderr
    #[arg(long)]
    pub dump: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Splits `key=value`; a missing `=` means an empty value.
pub fn split_pair(raw: &str) -> (&str, &str) {
    raw.split_once('=').unwrap_or((raw, ""))
}

/// Splits `Name: value`.
pub fn split_header(raw: &str) -> Option<(&str, &str)> {
    raw.split_once(':')
        .map(|(name, value)| (name.trim(), value.trim()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_minimal_args_parse() {
        let args = Args::try_parse_from(["fetchbind", "http://example.com"]).unwrap();
        assert_eq!(args.url, "http://example.com");
        assert_eq!(args.method, "GET");
        assert_eq!(args.charset, "auto");
        assert_eq!(args.retries, 2);
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.timeout.is_none());
    }

    #[test]
    fn test_cli_url_is_required() {
        let err = Args::try_parse_from(["fetchbind"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_repeatable_flags() {
        let args = Args::try_parse_from([
            "fetchbind",
            "http://example.com",
            "-H",
            "X-A: 1",
            "-H",
            "X-B: 2",
            "-p",
            "id=7",
            "-vv",
        ])
        .unwrap();
        assert_eq!(args.headers, vec!["X-A: 1", "X-B: 2"]);
        assert_eq!(args.params, vec!["id=7"]);
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_timeout_uses_duration_syntax() {
        let args =
            Args::try_parse_from(["fetchbind", "http://example.com", "-t", "1m30s"]).unwrap();
        assert_eq!(
            args.timeout.unwrap().to_std(),
            Some(std::time::Duration::from_secs(90))
        );
        assert!(Args::try_parse_from(["fetchbind", "http://example.com", "-t", "soon"]).is_err());
    }

    #[test]
    fn test_cli_retries_range() {
        assert!(Args::try_parse_from(["fetchbind", "http://e.com", "-r", "11"]).is_err());
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["fetchbind", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_split_helpers() {
        assert_eq!(split_pair("a=b=c"), ("a", "b=c"));
        assert_eq!(split_pair("flag"), ("flag", ""));
        assert_eq!(split_header("Accept:  text/html "), Some(("Accept", "text/html")));
        assert_eq!(split_header("broken"), None);
    }
}
