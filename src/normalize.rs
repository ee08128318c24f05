//! Strips volatile tokens out of error messages so that two logically
//! equivalent failures — differing only in timestamp, pid, temp path, etc. —
//! fold into the same fingerprint for history/clustering purposes.
//!
//! `normalize` is deterministic and idempotent: `normalize(normalize(m)) ==
//! normalize(m)` for all `m`, since every placeholder token is itself free of
//! the patterns it replaces.

use regex::Regex;
use std::sync::LazyLock;

const TS_PLACEHOLDER: &str = "<TIMESTAMP>";
const UUID_PLACEHOLDER: &str = "<UUID>";
const PORT_PLACEHOLDER: &str = ":<PORT>";
const PATH_PLACEHOLDER: &str = "<TMPDIR>";
const ADDR_PLACEHOLDER: &str = "<ADDR>";
const PID_PLACEHOLDER: &str = "pid <PID>";
const PROCESS_PLACEHOLDER: &str = "process <PID>";

static ISO_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})?").unwrap()
});
static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").unwrap()
});
static PORT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":\d{4,5}\b").unwrap());
static TEMP_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(/tmp/[^\s'\"]*)|(\\[Tt]emp\\[^\s'\"]*)|(\\tmp\\[^\s'\"]*)").unwrap()
});
static HEX_ADDR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"0x[0-9a-fA-F]{6,16}\b").unwrap());
static PID_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bpid\s+\d+\b").unwrap());
static PROCESS_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bprocess\s+\d+\b").unwrap());
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Replaces volatile tokens with fixed placeholders and collapses whitespace
/// runs to a single space.
pub fn normalize(message: &str) -> String {
    let s = ISO_TIMESTAMP.replace_all(message, TS_PLACEHOLDER);
    let s = UUID.replace_all(&s, UUID_PLACEHOLDER);
    let s = PORT.replace_all(&s, PORT_PLACEHOLDER);
    let s = TEMP_PATH.replace_all(&s, PATH_PLACEHOLDER);
    let s = HEX_ADDR.replace_all(&s, ADDR_PLACEHOLDER);
    // process-token before pid-token: "process 123" must not be left with a
    // dangling "pid"-shaped match from an overlapping pass.
    let s = PROCESS_TOKEN.replace_all(&s, PROCESS_PLACEHOLDER);
    let s = PID_TOKEN.replace_all(&s, PID_PLACEHOLDER);
    WHITESPACE_RUN.replace_all(&s, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_for_arbitrary_messages() {
        let messages = [
            "Timeout at 2024-01-01T00:00:00Z for test abc",
            "connection refused on 127.0.0.1:54321",
            "wrote to /tmp/playwright-abc123/output.png",
            "segfault at 0x7ffeeb1a2c30",
            "pid 4821 exited unexpectedly",
            "process 99 killed",
            "no volatile tokens here at all",
        ];
        for m in messages {
            let once = normalize(m);
            let twice = normalize(&once);
            assert_eq!(once, twice, "not idempotent for: {m}");
        }
    }

    #[test]
    fn scenario_3_timestamp_equivalence() {
        let a = normalize("Timeout at 2024-01-01T00:00:00Z for test abc");
        let b = normalize("Timeout at 2025-06-15T12:30:00Z for test abc");
        assert_eq!(a, b);
    }

    #[test]
    fn uuid_stability() {
        let a = normalize("failed for user 550e8400-e29b-41d4-a716-446655440000");
        let b = normalize("failed for user 123e4567-e89b-12d3-a456-426614174000");
        assert_eq!(a, b);
    }

    #[test]
    fn port_stability() {
        let a = normalize("ECONNREFUSED 127.0.0.1:54321");
        let b = normalize("ECONNREFUSED 127.0.0.1:8080");
        assert_eq!(a, b);
    }

    #[test]
    fn temp_path_stability() {
        let a = normalize("could not write /tmp/pw-xyz/screenshot.png");
        let b = normalize(r"could not write \Temp\pw-abc\screenshot.png");
        assert_eq!(a, b);
    }

    #[test]
    fn hex_address_stability() {
        let a = normalize("crash at 0x00007ffeeb1a2c30");
        let b = normalize("crash at 0xdeadbeefcafe");
        assert_eq!(a, b);
    }

    #[test]
    fn pid_and_process_token_stability() {
        let a = normalize("pid 123 timed out");
        let b = normalize("pid 9999999 timed out");
        assert_eq!(a, b);

        let c = normalize("process 1 exited");
        let d = normalize("process 42 exited");
        assert_eq!(c, d);
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(normalize("a    b\t\tc"), "a b c");
    }
}
