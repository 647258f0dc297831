// tests/pub_sub.rs

use zmq_engine::options::{SUBSCRIBE, UNSUBSCRIBE, XPUB_VERBOSE};
use zmq_engine::{Msg, Socket, SocketType, ZmqError};
use std::time::Duration;
mod common;

use common::{LONG_TIMEOUT, SHORT_TIMEOUT};

/// Publishes `topic` until `sub` sees it; covers the subscription still
/// travelling to the publisher.
async fn publish_until_received(publisher: &Socket, sub: &Socket, payload: &str) -> Result<Msg, ZmqError> {
  let deadline = tokio::time::Instant::now() + LONG_TIMEOUT;
  loop {
    publisher.send(Msg::from(payload)).await?;
    match common::recv_timeout(sub, Duration::from_millis(50)).await {
      Ok(msg) => return Ok(msg),
      Err(ZmqError::Timeout) if tokio::time::Instant::now() < deadline => continue,
      Err(e) => return Err(e),
    }
  }
}

#[tokio::test]
async fn test_pub_sub_tcp_basic() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let publisher = ctx.socket(SocketType::Pub)?;
  let sub = ctx.socket(SocketType::Sub)?;

  let endpoint = common::bind_resolve(&publisher, "tcp://127.0.0.1:*").await?;
  sub.set_option(SUBSCRIBE, "").await?;
  sub.connect(&endpoint).await?;

  let msg = publish_until_received(&publisher, &sub, "tick").await?;
  assert_eq!(msg.data(), b"tick");
  ctx.terminate().await?;
  Ok(())
}

#[tokio::test]
async fn test_pub_sub_inproc_topic_filter() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let publisher = ctx.socket(SocketType::Pub)?;
  let sub = ctx.socket(SocketType::Sub)?;
  let endpoint = common::unique_inproc_endpoint();

  publisher.bind(&endpoint).await?;
  sub.set_option(SUBSCRIBE, "weather").await?;
  sub.connect(&endpoint).await?;

  publisher.send(Msg::from("sports.football")).await?;
  publisher.send(Msg::from("weather.london")).await?;
  publisher
    .send_multipart(vec![Msg::from("weather.paris"), Msg::from("sunny")])
    .await?;

  assert_eq!(common::recv_timeout(&sub, LONG_TIMEOUT).await?.data(), b"weather.london");
  let frames = common::recv_multipart_timeout(&sub, LONG_TIMEOUT).await?;
  assert_eq!(
    common::frames_as_vecs(&frames),
    vec![b"weather.paris".to_vec(), b"sunny".to_vec()]
  );
  assert!(matches!(
    common::recv_timeout(&sub, SHORT_TIMEOUT).await,
    Err(ZmqError::Timeout)
  ));
  ctx.terminate().await?;
  Ok(())
}

#[tokio::test]
async fn test_pub_sub_unsubscribe_stops_delivery() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let publisher = ctx.socket(SocketType::Pub)?;
  let sub = ctx.socket(SocketType::Sub)?;
  let endpoint = common::unique_inproc_endpoint();

  publisher.bind(&endpoint).await?;
  sub.connect(&endpoint).await?;
  sub.set_option(SUBSCRIBE, "a").await?;

  publisher.send(Msg::from("a1")).await?;
  assert_eq!(common::recv_timeout(&sub, LONG_TIMEOUT).await?.data(), b"a1");

  sub.set_option(UNSUBSCRIBE, "a").await?;
  publisher.send(Msg::from("a2")).await?;
  assert!(matches!(
    common::recv_timeout(&sub, SHORT_TIMEOUT).await,
    Err(ZmqError::Timeout)
  ));
  ctx.terminate().await?;
  Ok(())
}

#[tokio::test]
async fn test_pub_sub_multiple_subscribers() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let publisher = ctx.socket(SocketType::Pub)?;
  let sub_a = ctx.socket(SocketType::Sub)?;
  let sub_b = ctx.socket(SocketType::Sub)?;
  let endpoint = common::unique_inproc_endpoint();

  publisher.bind(&endpoint).await?;
  for sub in [&sub_a, &sub_b] {
    sub.set_option(SUBSCRIBE, "").await?;
    sub.connect(&endpoint).await?;
  }

  publisher.send(Msg::from("broadcast")).await?;
  for sub in [&sub_a, &sub_b] {
    assert_eq!(common::recv_timeout(sub, LONG_TIMEOUT).await?.data(), b"broadcast");
  }
  ctx.terminate().await?;
  Ok(())
}

#[tokio::test]
async fn test_pub_without_subscribers_drops_silently() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let publisher = ctx.socket(SocketType::Pub)?;
  publisher.bind(&common::unique_inproc_endpoint()).await?;
  publisher.try_send(Msg::from("into the void"))?;
  assert!(matches!(publisher.try_recv(), Err(ZmqError::InvalidSocketType(_))));
  ctx.terminate().await?;
  Ok(())
}

#[tokio::test]
async fn test_xpub_reports_subscriptions() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let xpub = ctx.socket(SocketType::XPub)?;
  let sub_a = ctx.socket(SocketType::Sub)?;
  let sub_b = ctx.socket(SocketType::Sub)?;
  let endpoint = common::unique_inproc_endpoint();

  xpub.bind(&endpoint).await?;
  sub_a.connect(&endpoint).await?;
  sub_b.connect(&endpoint).await?;

  sub_a.set_option(SUBSCRIBE, "news").await?;
  let event = common::recv_timeout(&xpub, LONG_TIMEOUT).await?;
  assert_eq!(event.data(), b"\x01news");

  // A second subscriber to the same topic does not change the union.
  sub_b.set_option(SUBSCRIBE, "news").await?;
  assert!(matches!(
    common::recv_timeout(&xpub, SHORT_TIMEOUT).await,
    Err(ZmqError::Timeout)
  ));

  xpub.set_option(XPUB_VERBOSE, true).await?;
  sub_b.set_option(SUBSCRIBE, "sport").await?;
  assert_eq!(common::recv_timeout(&xpub, LONG_TIMEOUT).await?.data(), b"\x01sport");

  sub_a.set_option(UNSUBSCRIBE, "news").await?;
  sub_b.set_option(UNSUBSCRIBE, "news").await?;
  assert_eq!(common::recv_timeout(&xpub, LONG_TIMEOUT).await?.data(), b"\x00news");
  ctx.terminate().await?;
  Ok(())
}

#[tokio::test]
async fn test_xsub_sends_raw_subscriptions() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let publisher = ctx.socket(SocketType::Pub)?;
  let xsub = ctx.socket(SocketType::XSub)?;
  let endpoint = common::bind_resolve(&publisher, "tcp://127.0.0.1:*").await?;

  xsub.connect(&endpoint).await?;
  xsub.send(Msg::from(&b"\x01alerts"[..])).await?;

  let deadline = tokio::time::Instant::now() + LONG_TIMEOUT;
  loop {
    publisher.send(Msg::from("alerts.disk")).await?;
    publisher.send(Msg::from("noise")).await?;
    match common::recv_timeout(&xsub, Duration::from_millis(50)).await {
      Ok(msg) => {
        assert_eq!(msg.data(), b"alerts.disk");
        break;
      }
      Err(ZmqError::Timeout) if tokio::time::Instant::now() < deadline => continue,
      Err(e) => return Err(e),
    }
  }
  ctx.terminate().await?;
  Ok(())
}
