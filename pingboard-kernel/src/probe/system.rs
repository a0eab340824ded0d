//! ICMP reachability through the system `ping` binary
//!
//! Raw ICMP sockets need privileges; the system tool does not. One echo request
//! per probe, the child is killed if the engine's timeout drops the future.

use super::{ProbeError, ProbeFuture, ProbeReply, Prober};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPing;

impl Prober for SystemPing {
    fn probe<'a>(&'a self, address: &'a str, timeout: Duration) -> ProbeFuture<'a> {
        Box::pin(ping_once(address, timeout))
    }
}

async fn ping_once(address: &str, timeout: Duration) -> Result<ProbeReply, ProbeError> {
    validate_address(address)?;

    let mut command = AsyncCommand::new("ping");
    command.args(ping_args(timeout)).arg(address);

    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    // sous Windows "Destination host unreachable" sort avec le code 0
    let alive = output.status.success() && (!cfg!(target_os = "windows") || stdout.contains("TTL="));
    let latency_ms = if alive { parse_latency_ms(&stdout).unwrap_or(0.0) } else { 0.0 };

    Ok(ProbeReply { alive, latency_ms })
}

fn ping_args(timeout: Duration) -> Vec<String> {
    let secs = timeout.as_secs().max(1);
    let millis = timeout.as_millis().max(1);

    if cfg!(target_os = "windows") {
        vec!["-n".into(), "1".into(), "-w".into(), millis.to_string()]
    } else if cfg!(target_os = "macos") {
        vec!["-c".into(), "1".into(), "-W".into(), millis.to_string()]
    } else {
        vec!["-c".into(), "1".into(), "-W".into(), secs.to_string()]
    }
}

/// Hostnames and IP literals only: anything that could be read as a flag is refused.
fn validate_address(address: &str) -> Result<(), ProbeError> {
    let valid = !address.is_empty()
        && !address.starts_with('-')
        && address
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '_' | '%'));

    if valid {
        Ok(())
    } else {
        Err(ProbeError::InvalidAddress(address.to_string()))
    }
}

/// Extracts the round-trip time from `time=0.045 ms`, `time=12ms` or `time<1ms`
fn parse_latency_ms(output: &str) -> Option<f64> {
    let start = output.find("time=").or_else(|| output.find("time<"))? + "time=".len();
    let number: String = output[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_linux_output() {
        let out = "PING 10.0.0.1 (10.0.0.1) 56(84) bytes of data.\n\
                   64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=0.045 ms\n";
        assert_eq!(parse_latency_ms(out), Some(0.045));
    }

    #[test]
    fn test_parse_windows_output() {
        assert_eq!(parse_latency_ms("Reply from 10.0.0.1: bytes=32 time=12ms TTL=128"), Some(12.0));
        assert_eq!(parse_latency_ms("Reply from 10.0.0.1: bytes=32 time<1ms TTL=128"), Some(1.0));
    }

    #[test]
    fn test_parse_without_time_field() {
        assert_eq!(parse_latency_ms("Request timed out."), None);
    }

    #[test]
    fn test_address_validation() {
        assert!(validate_address("10.0.0.1").is_ok());
        assert!(validate_address("kiosk-3.plant.lan").is_ok());
        assert!(validate_address("fe80::1%eth0").is_ok());
        assert!(validate_address("-f").is_err());
        assert!(validate_address("10.0.0.1; reboot").is_err());
        assert!(validate_address("").is_err());
    }

    #[tokio::test]
    async fn test_invalid_address_is_refused_before_spawning() {
        let result = SystemPing.probe("--help", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ProbeError::InvalidAddress(_))));
    }
}
