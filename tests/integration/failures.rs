use crate::*;

use lottery_client::{ClientError, Driver, Phase, VecSource};
use tokio_util::sync::CancellationToken;

// ══════════════════════════════════════════════════════════════════════════════
//  Fatal failures
// ══════════════════════════════════════════════════════════════════════════════

/// A rejected chunk stops the run; nothing after it is sent.
#[tokio::test]
async fn test_chunk_rejected() {
    let aggregator = MockAggregator::start(Script {
        chunk_ack: *b"NO",
        ..Script::default()
    })
    .await;

    let config = client_config(&aggregator, 2);
    let driver = Driver::new(dialer(&config), &config);
    let mut source: VecSource = (0..5).map(bet_row).collect();

    let err = driver
        .run(&mut source, CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ClientError::Protocol { phase, ack } => {
            assert_eq!(phase, Phase::SubmittingChunks);
            assert_eq!(&ack, b"NO");
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
    assert_eq!(aggregator.chunk_sizes(), vec![2]);
    assert_eq!(aggregator.connections(), 1);
}

/// Nobody listening: the dial budget runs out and the run fails.
#[tokio::test]
async fn test_dial_exhaustion() {
    let address = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };

    let config = ClientConfig {
        server_address: address.clone(),
        connect_retries: 2,
        connect_backoff: Backoff::fixed(10),
        ..ClientConfig::default()
    };
    let driver = Driver::new(dialer(&config), &config);
    let mut source: VecSource = (0..1).map(bet_row).collect();

    let err = tokio::time::timeout(RUN_LIMIT, driver.run(&mut source, CancellationToken::new()))
        .await
        .expect("dial did not give up")
        .unwrap_err();

    match err {
        ClientError::Connection {
            address: got,
            attempts,
            ..
        } => {
            assert_eq!(got, address);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected connection error, got {other:?}"),
    }
}

/// A bet over the field limits fails before any connection is made.
#[tokio::test]
async fn test_invalid_bet_never_dials() {
    let aggregator = MockAggregator::start(Script::default()).await;
    let config = client_config(&aggregator, 10);
    let driver = Driver::new(dialer(&config), &config);

    let mut source: VecSource = [
        ["Ana", "Diaz", "30904465", "1999-03-17", "1"],
        ["A name well past the limit", "Diaz", "30904465", "1999-03-17", "2"],
    ]
    .into_iter()
    .collect();

    let err = driver
        .run(&mut source, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Validation { line: 2, .. }));
    assert_eq!(aggregator.connections(), 0);
}

/// A rejected announcement is fatal; no poll follows.
#[tokio::test]
async fn test_announcement_rejected() {
    let aggregator = MockAggregator::start(Script {
        end_ack: *b"\x00\x01",
        ..Script::default()
    })
    .await;

    let config = client_config(&aggregator, 10);
    let driver = Driver::new(dialer(&config), &config);

    let err = driver
        .run(&mut VecSource::new(Vec::new()), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::Protocol { phase: Phase::AnnouncingCompletion, .. }
    ));
    assert!(err.to_string().contains("0x0001"));
    assert_eq!(aggregator.polls(), 0);
}
