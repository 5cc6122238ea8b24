//! The loopback subcommand end to end

use std::time::Duration;

use blexfer_cli::{run_loopback, AppConfig, Cli, Commands};
use clap::Parser;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_loopback_returns_the_sent_message() {
    let message = b"hello over a pretend radio, long enough for several chunks".to_vec();

    let received = timeout(WAIT, run_loopback(&AppConfig::default(), message.clone(), 4))
        .await
        .expect("loopback timed out")
        .unwrap();

    assert_eq!(received, message);
}

#[tokio::test]
async fn test_loopback_with_single_slot_queue() {
    let message: Vec<u8> = (b'a'..=b'z').cycle().take(137).collect();

    let received = timeout(WAIT, run_loopback(&AppConfig::default(), message.clone(), 1))
        .await
        .expect("loopback timed out")
        .unwrap();

    assert_eq!(received, message);
}

#[tokio::test]
async fn test_loopback_empty_message() {
    let received = timeout(WAIT, run_loopback(&AppConfig::default(), Vec::new(), 4))
        .await
        .expect("loopback timed out")
        .unwrap();

    assert!(received.is_empty());
}

#[test]
fn test_parses_loopback_subcommand() {
    let cli = Cli::try_parse_from(["blexfer", "-v", "loopback", "--message", "hi", "-q", "2"]).unwrap();

    assert!(cli.verbose);
    match cli.command {
        Commands::Loopback {
            message,
            queue_depth,
        } => {
            assert_eq!(message, "hi");
            assert_eq!(queue_depth, 2);
        }
        _ => panic!("expected loopback"),
    }
}

#[test]
fn test_peripheral_requires_a_message() {
    assert!(Cli::try_parse_from(["blexfer", "peripheral"]).is_err());
}
