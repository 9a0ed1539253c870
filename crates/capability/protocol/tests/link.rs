use scale_protocol::{FrameSource, LinkConfig, LinkError, LinkManager, LinkState};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

fn fast_config(port: u16) -> LinkConfig {
    let mut config = LinkConfig::new("127.0.0.1", port);
    config.connect_timeout = Duration::from_millis(500);
    config.read_timeout = Duration::from_millis(50);
    config.reconnect_delay = Duration::from_millis(50);
    config
}

async fn wait_for_frames(link: &LinkManager, count: usize) -> Vec<String> {
    for _ in 0..100 {
        let frames = link.recent_frames(Duration::from_secs(60));
        if frames.len() >= count {
            return frames.into_iter().map(|f| f.text).collect();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {count} frames");
}

#[tokio::test]
async fn captures_frames_in_arrival_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        socket.write_all(b"ST,GS,  1.25kg\r\nST,GS,").await.expect("write");
        tokio::time::sleep(Duration::from_millis(30)).await;
        socket.write_all(b"  1.30kg\r\nUS,GS,  1.31kg\r\n").await.expect("write");
        tokio::time::sleep(Duration::from_millis(500)).await;
    });

    let link = LinkManager::new(fast_config(port));
    link.start_capture().await.expect("start");
    assert!(link.is_connected());

    let frames = wait_for_frames(&link, 3).await;
    assert_eq!(
        frames,
        vec!["ST,GS,  1.25kg", "ST,GS,  1.30kg", "US,GS,  1.31kg"]
    );

    // 第一帧来自第一次读取，后两帧来自 30ms 后的第二次读取
    let all = link.frames_since(None);
    assert_eq!(all.len(), 3);
    let after_first: Vec<String> = link
        .frames_since(Some(all[0].captured_at))
        .into_iter()
        .map(|f| f.text)
        .collect();
    assert_eq!(after_first, vec!["ST,GS,  1.30kg", "US,GS,  1.31kg"]);
    assert!(link.frames_since(Some(all[2].captured_at)).is_empty());

    let health = link.health();
    assert!(health.connected);
    assert_eq!(health.consecutive_failures, 0);
    assert!(health.last_successful_read.is_some());
    assert_eq!(health.buffer_size, 3);

    link.clear_buffer();
    assert!(link.recent_frames(Duration::from_secs(60)).is_empty());

    link.close().await;
    server.abort();
}

#[tokio::test]
async fn connect_failure_is_reported_and_counted() {
    // 绑定后立即释放，得到一个大概率无人监听的端口
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);

    let link = LinkManager::new(fast_config(port));
    let err = link.connect().await.expect_err("nothing listening");
    assert!(matches!(err, LinkError::Connection(_) | LinkError::Timeout(_)));
    assert_eq!(link.state(), LinkState::Faulted);
    assert_eq!(link.health().consecutive_failures, 1);

    assert!(link.start_capture().await.is_err());
    assert_eq!(link.health().consecutive_failures, 2);
    assert!(!link.health().connected);
}

#[tokio::test]
async fn reconnects_after_peer_closes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let server = tokio::spawn(async move {
        let (mut first, _) = listener.accept().await.expect("accept");
        first.write_all(b"A 1.0\r\n").await.expect("write");
        drop(first);
        let (mut second, _) = listener.accept().await.expect("accept again");
        second.write_all(b"B 2.0\r\n").await.expect("write");
        tokio::time::sleep(Duration::from_millis(500)).await;
    });

    let link = LinkManager::new(fast_config(port));
    link.start_capture().await.expect("start");
    let frames = wait_for_frames(&link, 2).await;
    assert_eq!(frames, vec!["A 1.0", "B 2.0"]);
    assert!(link.is_connected());

    link.close().await;
    server.abort();
}

#[tokio::test]
async fn stop_and_close_are_idempotent() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let server = tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.expect("accept");
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let link = LinkManager::new(fast_config(port));
    link.stop_capture().await;
    link.close().await;

    link.ensure_capturing().await.expect("start");
    link.ensure_capturing().await.expect("already capturing");
    link.stop_capture().await;
    link.stop_capture().await;
    assert!(link.is_connected());

    link.close().await;
    link.close().await;
    assert_eq!(link.state(), LinkState::Disconnected);
    assert!(!link.health().connected);
    server.abort();
}
