use crate::*;

use duplex_core::time::TICK_SECS;

/// start-tx answers '1', stop-tx answers '2', and both workers have
/// stopped by the time '2' arrives.
#[tokio::test(flavor = "multi_thread")]
async fn test_transmit_start_stop() -> Result<()> {
    let node = start_node(NodeOptions::default()).await?;
    let mut control = node.connect().await?;

    send(&mut control, b"1").await?;
    assert_eq!(next_status(&mut control).await?, b'1');
    tokio::time::sleep(Duration::from_millis(450)).await;

    send(&mut control, b"2\n").await?;
    let stop_sent = std::time::Instant::now();
    assert_eq!(next_status(&mut control).await?, b'2');
    // both workers join within one tick of the stop
    let latency = stop_sent.elapsed();
    assert!(latency < Duration::from_millis(250), "stop took {latency:?}");

    let bursts = node.radio.bursts();
    let switches = node.radio.gpio_events().len();
    assert!(bursts.len() >= 2, "bursts: {}", bursts.len());
    // nothing is written or switched after the stop
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(node.radio.bursts().len(), bursts.len());
    assert_eq!(node.radio.gpio_events().len(), switches);

    // one burst per tick, each restarting at the head of the waveform
    let (first, second) = (bursts[0].start.unwrap(), bursts[1].start.unwrap());
    assert!((second.secs_since(first) - TICK_SECS).abs() < 1e-9);
    assert_eq!(bursts[0].first_sample, Some(Sample::new(1.0, 0.0)));
    // chunk length = samps (256); chunks per burst = (2048 / 1000) * 10
    assert_eq!(bursts[0].chunks, 20);
    assert_eq!(bursts[0].samples, 20 * 256);

    let gpio = node.radio.gpio_events();
    assert_eq!(gpio.last().unwrap().port_mask, 0xFF);
    assert_eq!((gpio.len() - 1) % 2, 0, "whole sweeps of two tx ports");
    Ok(())
}

/// stop-tx with nothing running produces no status byte.
#[tokio::test(flavor = "multi_thread")]
async fn test_stop_while_idle_is_silent() -> Result<()> {
    let node = start_node(NodeOptions::default()).await?;
    let mut control = node.connect().await?;

    send(&mut control, b"2").await?;
    assert!(stays_silent(&mut control, Duration::from_millis(300)).await);
    assert!(node.radio.bursts().is_empty());
    assert!(node.radio.gpio_events().is_empty());
    Ok(())
}

/// start-rx while transmitting is ignored; the transmit session keeps going.
#[tokio::test(flavor = "multi_thread")]
async fn test_start_rx_while_transmitting_is_ignored() -> Result<()> {
    let node = start_node(NodeOptions::default()).await?;
    let mut control = node.connect().await?;

    send(&mut control, b"1").await?;
    assert_eq!(next_status(&mut control).await?, b'1');
    send(&mut control, b"3").await?;
    assert!(stays_silent(&mut control, Duration::from_millis(300)).await);
    assert!(node.radio.rx_requests().is_empty());

    send(&mut control, b"2").await?;
    assert_eq!(next_status(&mut control).await?, b'2');
    Ok(())
}

/// Dropping the control link mid-transmit stops the session and, without
/// serve-forever, ends the server.
#[tokio::test(flavor = "multi_thread")]
async fn test_disconnect_during_transmit_ends_server() -> Result<()> {
    let node = start_node(NodeOptions::default()).await?;
    let mut control = node.connect().await?;

    send(&mut control, b"1").await?;
    assert_eq!(next_status(&mut control).await?, b'1');
    tokio::time::sleep(Duration::from_millis(250)).await;
    drop(control);

    let radio = node.radio.clone();
    node.join(Duration::from_secs(3)).await?;
    assert!(!radio.bursts().is_empty());
    assert_eq!(radio.gpio_events().last().unwrap().port_mask, 0xFF);
    Ok(())
}
