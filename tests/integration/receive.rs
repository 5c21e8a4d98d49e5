use crate::*;

use duplex_core::samples::{decode_samples, load_samples};

const QUIET: Duration = Duration::from_millis(200);

/// A 2048-sample capture arrives downstream as one full packet and one
/// remainder, and is followed by receive-done.
#[tokio::test(flavor = "multi_thread")]
async fn test_capture_forwarded_in_bounded_packets() -> Result<()> {
    let node = start_node(NodeOptions::default()).await?;
    let mut control = node.connect().await?;

    send(&mut control, b"3").await?;
    assert_eq!(next_status(&mut control).await?, b'3');

    let packets = node.drain_downstream(QUIET).await;
    let sizes: Vec<usize> = packets.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![16000, 384]);

    let samples: Vec<Sample> = packets
        .iter()
        .map(|p| decode_samples(p))
        .collect::<Result<Vec<_>, _>>()?
        .concat();
    assert_eq!(samples.len(), 2048);
    assert_eq!(samples[0], Sample::new(0.0, 0.0));
    assert_eq!(samples[2047], Sample::new(2047.0, -2047.0));

    // 2 tx × 2 rx switch events plus the final all-ports event
    let gpio = node.radio.gpio_events();
    assert_eq!(gpio.len(), 5);
    assert_eq!(gpio.last().unwrap().port_mask, 0xFF);

    drop(control);
    node.join(Duration::from_secs(3)).await
}

/// The settle prefix is captured but never forwarded.
#[tokio::test(flavor = "multi_thread")]
async fn test_capture_drops_delay_prefix() -> Result<()> {
    let node = start_node(NodeOptions {
        tdd: tdd(256, 2, 2, 48),
        ..NodeOptions::default()
    })
    .await?;
    let mut control = node.connect().await?;

    send(&mut control, b"3\r\n").await?;
    assert_eq!(next_status(&mut control).await?, b'3');

    let packets = node.drain_downstream(QUIET).await;
    let first = decode_samples(&packets[0])?;
    assert_eq!(first[0], Sample::new(48.0, -48.0));
    assert_eq!(packets.iter().map(Vec::len).sum::<usize>(), 2048 * 8);

    let (requested, start) = node.radio.rx_requests()[0];
    assert_eq!(requested, 2096);
    // first switch lands after the settle samples
    let base = node.radio.gpio_events()[0].due_time;
    assert!((base.secs_since(start) - 48.0 / SAMPLE_RATE).abs() < 1e-9);
    Ok(())
}

/// A device error mid-capture reports receive-failed and forwards nothing.
#[tokio::test(flavor = "multi_thread")]
async fn test_capture_shortfall_reports_failure() -> Result<()> {
    let node = start_node(NodeOptions {
        tdd: tdd(125, 1, 2, 0),
        faults: SimFaults {
            rx_fail_after: Some(300),
            ..SimFaults::default()
        },
        ..NodeOptions::default()
    })
    .await?;
    let mut control = node.connect().await?;

    send(&mut control, b"3").await?;
    assert_eq!(next_status(&mut control).await?, b'4');
    assert!(node.drain_downstream(QUIET).await.is_empty());

    // the coordinator is idle again and accepts a new capture
    send(&mut control, b"3").await?;
    assert_eq!(next_status(&mut control).await?, b'4');
    assert_eq!(node.radio.rx_requests().len(), 2);
    Ok(())
}

/// A receive call that fails outright is a failed capture, as is a stream
/// that cannot be opened.
#[tokio::test(flavor = "multi_thread")]
async fn test_capture_io_errors_report_failure() -> Result<()> {
    for faults in [
        SimFaults {
            rx_io_error_after: Some(300),
            ..SimFaults::default()
        },
        SimFaults {
            stream_in_fails: true,
            ..SimFaults::default()
        },
    ] {
        let node = start_node(NodeOptions {
            tdd: tdd(125, 1, 2, 0),
            faults,
            ..NodeOptions::default()
        })
        .await?;
        let mut control = node.connect().await?;

        send(&mut control, b"3").await?;
        assert_eq!(next_status(&mut control).await?, b'4');
        assert!(node.drain_downstream(QUIET).await.is_empty());
        // the switch is still left with every port enabled
        assert_eq!(node.radio.gpio_events().last().unwrap().port_mask, 0xFF);

        drop(control);
        node.join(Duration::from_secs(3)).await?;
    }
    Ok(())
}

/// A second start-rx while a capture is running is ignored.
#[tokio::test(flavor = "multi_thread")]
async fn test_repeated_start_rx_is_ignored() -> Result<()> {
    let node = start_node(NodeOptions {
        tdd: tdd(25_000, 2, 2, 0),
        ..NodeOptions::default()
    })
    .await?;
    let mut control = node.connect().await?;

    send(&mut control, b"3").await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    send(&mut control, b"3").await?;

    assert_eq!(next_status(&mut control).await?, b'3');
    assert!(stays_silent(&mut control, Duration::from_millis(500)).await);
    assert_eq!(node.radio.rx_requests().len(), 1);
    Ok(())
}

/// With an rx file configured, every capture is written to it.
#[tokio::test(flavor = "multi_thread")]
async fn test_capture_persisted_to_rx_file() -> Result<()> {
    let path = temp_path("capture.dat");
    let node = start_node(NodeOptions {
        rx_file: Some(path.clone()),
        ..NodeOptions::default()
    })
    .await?;
    let mut control = node.connect().await?;

    send(&mut control, b"3").await?;
    assert_eq!(next_status(&mut control).await?, b'3');

    let saved = load_samples(&path)?;
    assert_eq!(saved.len(), 2048);
    assert_eq!(saved[10], Sample::new(10.0, -10.0));
    std::fs::remove_file(&path).ok();
    Ok(())
}

/// Closing the control link mid-capture ends the session without
/// forwarding.
#[tokio::test(flavor = "multi_thread")]
async fn test_disconnect_during_capture_skips_forwarding() -> Result<()> {
    let node = start_node(NodeOptions {
        tdd: tdd(25_000, 2, 2, 0),
        ..NodeOptions::default()
    })
    .await?;
    let mut control = node.connect().await?;

    send(&mut control, b"3").await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(control);

    let radio = node.radio.clone();
    let downstream_empty = node.drain_downstream(Duration::from_millis(100)).await.is_empty();
    node.join(Duration::from_secs(5)).await?;
    assert!(downstream_empty);
    assert_eq!(radio.rx_requests().len(), 1);
    assert_eq!(radio.gpio_events().last().unwrap().port_mask, 0xFF);
    Ok(())
}
