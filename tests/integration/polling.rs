use crate::*;

use lottery_client::{ClientError, Driver, RunOutcome, VecSource};
use tokio_util::sync::CancellationToken;

/// Each poll attempt dials its own connection.
#[tokio::test]
async fn test_every_poll_opens_a_new_connection() {
    let aggregator = MockAggregator::start(Script {
        polls: VecDeque::from([
            PollReply::NotReady(*b"NO"),
            PollReply::NotReady(*b"NO"),
            PollReply::NotReady(*b"WA"),
            PollReply::Ready,
        ]),
        ..Script::default()
    })
    .await;

    let config = client_config(&aggregator, 10);
    let driver = Driver::new(dialer(&config), &config);
    let mut source: VecSource = (0..3).map(bet_row).collect();

    let outcome = driver
        .run(&mut source, CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Completed(ref r) if r.polls == 4));
    assert_eq!(aggregator.polls(), 4);
    // one chunk, one announcement, four polls
    assert_eq!(aggregator.connections(), 6);
}

/// With a cap configured, polling gives up after that many attempts.
#[tokio::test]
async fn test_poll_cap_reached() {
    let aggregator = MockAggregator::start(Script {
        polls: VecDeque::new(),
        ..Script::default()
    })
    .await;

    let mut config = client_config(&aggregator, 10);
    config.poll_max_attempts = Some(3);
    let driver = Driver::new(dialer(&config), &config);

    let err = driver
        .run(&mut VecSource::new(Vec::new()), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::PollExhausted { attempts: 3 }));
    assert_eq!(aggregator.polls(), 3);
}

/// An unbounded poll ends cleanly when the token is cancelled.
#[tokio::test]
async fn test_cancel_during_unbounded_poll() {
    let aggregator = MockAggregator::start(Script {
        polls: VecDeque::new(),
        ..Script::default()
    })
    .await;

    let mut config = client_config(&aggregator, 10);
    config.poll_backoff = Backoff::fixed(20);
    assert_eq!(config.poll_max_attempts, None);
    let driver = Driver::new(dialer(&config), &config);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            cancel.cancel();
        });
    }

    let mut source: VecSource = (0..2).map(bet_row).collect();
    let outcome = tokio::time::timeout(RUN_LIMIT, driver.run(&mut source, cancel))
        .await
        .expect("cancellation did not stop the run")
        .unwrap();

    assert_eq!(outcome, RunOutcome::Cancelled);
    assert_eq!(aggregator.chunk_sizes(), vec![2]);
    assert!(aggregator.polls() >= 2, "polled {} times", aggregator.polls());
}
