#![cfg(unix)]

use std::os::unix::net::UnixListener;
use std::path::Path;
use std::time::Duration;

use channel_layer::{
    //
    ChannelLayer,
    ChannelLayerBuilder,
    HostServer,
    Layer,
    LayerError,
    Message,
    Result,
};

fn payload(n: i64) -> Message {
    // ---
    let mut message = Message::new();
    message.insert("n".to_owned(), n.into());
    message
}

fn connect(socket: &Path) -> Result<ChannelLayer> {
    ChannelLayerBuilder::new().ipc(socket).capacity(3).build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_layers_share_state_through_host() -> Result<()> {
    // ---
    // Arrange
    let dir = tempfile::tempdir()?;
    let socket = dir.path().join("host.sock");
    let server = HostServer::bind(&socket)?;
    let alice = connect(&socket)?;
    let bob = connect(&socket)?;

    // Act
    alice.send("inbox", payload(1)).await?;
    alice.send("inbox", payload(2)).await?;

    // Assert
    assert_eq!(bob.receive("inbox").await?["n"], 1);
    assert_eq!(bob.receive("inbox").await?["n"], 2);
    assert_eq!(server.store().channel_count(), 0);

    alice.close().await?;
    bob.close().await?;
    server.shutdown()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_errors_cross_the_socket() -> Result<()> {
    // ---
    let dir = tempfile::tempdir()?;
    let socket = dir.path().join("host.sock");
    let server = HostServer::bind(&socket)?;
    let layer = connect(&socket)?;

    for n in 0..3 {
        layer.send("bounded", payload(n)).await?;
    }
    assert!(matches!(
        layer.send("bounded", payload(3)).await,
        Err(LayerError::ChannelFull(ref name)) if name == "bounded"
    ));
    assert!(matches!(
        layer
            .receive_with_timeout("empty", Duration::from_millis(50))
            .await,
        Err(LayerError::Timeout)
    ));

    layer.close().await?;
    server.shutdown()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_groups_span_processes() -> Result<()> {
    // ---
    let dir = tempfile::tempdir()?;
    let socket = dir.path().join("host.sock");
    let server = HostServer::bind(&socket)?;
    let subscriber = connect(&socket)?;
    let publisher = connect(&socket)?;

    let reply = subscriber.new_channel("specific.")?;
    subscriber.group_add("news", &reply).await?;
    assert_eq!(publisher.group_members("news").await?, vec![reply.clone()]);

    publisher.group_send("news", payload(7)).await?;
    assert_eq!(subscriber.receive(&reply).await?["n"], 7);

    subscriber.close().await?;
    publisher.close().await?;
    server.shutdown()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocked_receive_wakes_on_remote_send() -> Result<()> {
    // ---
    let dir = tempfile::tempdir()?;
    let socket = dir.path().join("host.sock");
    let server = HostServer::bind(&socket)?;
    let consumer = connect(&socket)?;
    let producer = connect(&socket)?;

    let waiting = {
        let consumer = consumer.clone();
        tokio::spawn(async move { consumer.receive("wake").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    producer.send("wake", payload(42)).await?;

    let message = waiting.await.expect("receive task panicked")?;
    assert_eq!(message["n"], 42);

    consumer.close().await?;
    producer.close().await?;
    server.shutdown()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_closing_one_client_leaves_host_running() -> Result<()> {
    // ---
    let dir = tempfile::tempdir()?;
    let socket = dir.path().join("host.sock");
    let server = HostServer::bind(&socket)?;
    let leaving = connect(&socket)?;
    let staying = connect(&socket)?;

    leaving.send("kept", payload(1)).await?;
    leaving.close().await?;

    assert!(matches!(
        leaving.send("kept", payload(2)).await,
        Err(LayerError::LayerClosed)
    ));
    assert_eq!(staying.receive("kept").await?["n"], 1);

    staying.close().await?;
    server.shutdown()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_layer_close_unblocks_remote_receive() -> Result<()> {
    // ---
    let dir = tempfile::tempdir()?;
    let socket = dir.path().join("host.sock");
    let server = HostServer::bind(&socket)?;
    let layer = connect(&socket)?;

    let waiting = {
        let layer = layer.clone();
        tokio::spawn(async move { layer.receive("silent").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(5), layer.close())
        .await
        .expect("close hung on a blocked receive")?;

    let out = waiting.await.expect("receive task panicked");
    assert!(matches!(out, Err(LayerError::LayerClosed)));

    server.shutdown()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_host_shutdown_fails_clients() -> Result<()> {
    // ---
    let dir = tempfile::tempdir()?;
    let socket = dir.path().join("host.sock");
    let server = HostServer::bind(&socket)?;
    let layer = connect(&socket)?;
    layer.send("c", payload(1)).await?;

    server.shutdown()?;
    server.shutdown()?;

    assert!(!socket.exists());
    assert!(layer.send("c", payload(2)).await.is_err());

    layer.close().await
}

#[test]
fn test_bind_refuses_live_host_and_replaces_stale_socket() -> Result<()> {
    // ---
    let dir = tempfile::tempdir()?;
    let socket = dir.path().join("host.sock");

    // a listener that went away without cleaning up
    drop(UnixListener::bind(&socket)?);
    assert!(socket.exists());

    let server = HostServer::bind(&socket)?;
    match HostServer::bind(&socket) {
        Err(LayerError::Io(err)) => assert_eq!(err.kind(), std::io::ErrorKind::AddrInUse),
        Err(other) => panic!("expected AddrInUse, got {other:?}"),
        Ok(_) => panic!("second host bound to a live socket"),
    }

    drop(server);
    assert!(!socket.exists());
    Ok(())
}
