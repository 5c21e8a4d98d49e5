use crate::*;

/// Without serve-forever the server returns once its only connection closes.
#[tokio::test(flavor = "multi_thread")]
async fn test_single_connection_mode() -> Result<()> {
    let node = start_node(NodeOptions::default()).await?;
    let control = node.connect().await?;
    drop(control);
    node.join(Duration::from_secs(2)).await
}

/// With serve-forever a new peer gets a fresh, idle coordinator.
#[tokio::test(flavor = "multi_thread")]
async fn test_serve_forever_accepts_next_peer() -> Result<()> {
    let node = start_node(NodeOptions {
        serve_forever: true,
        ..NodeOptions::default()
    })
    .await?;

    let mut first = node.connect().await?;
    send(&mut first, b"1").await?;
    assert_eq!(next_status(&mut first).await?, b'1');
    drop(first);

    let mut second = node.connect().await?;
    send(&mut second, b"3").await?;
    assert_eq!(next_status(&mut second).await?, b'3');
    assert!(!node.server.is_finished());

    node.shutdown.cancel();
    node.join(Duration::from_secs(3)).await
}

/// Garbage on the control link is ignored and the session stays usable.
#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_payload_is_ignored() -> Result<()> {
    let node = start_node(NodeOptions::default()).await?;
    let mut control = node.connect().await?;

    send(&mut control, b"7").await?;
    assert!(stays_silent(&mut control, Duration::from_millis(100)).await);
    send(&mut control, b"hello").await?;
    assert!(stays_silent(&mut control, Duration::from_millis(100)).await);

    send(&mut control, b"3").await?;
    assert_eq!(next_status(&mut control).await?, b'3');
    Ok(())
}

/// Shutdown while transmitting stops the session and the server.
#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_stops_active_session() -> Result<()> {
    let node = start_node(NodeOptions::default()).await?;
    let mut control = node.connect().await?;

    send(&mut control, b"1").await?;
    assert_eq!(next_status(&mut control).await?, b'1');

    node.shutdown.cancel();
    let radio = node.radio.clone();
    node.join(Duration::from_secs(3)).await?;

    let bursts = radio.bursts().len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(radio.bursts().len(), bursts);
    assert_eq!(radio.gpio_events().last().unwrap().port_mask, 0xFF);

    // the server closed the link without a stop notice
    let mut b = [0u8; 1];
    assert_eq!(control.read(&mut b).await?, 0);
    Ok(())
}
