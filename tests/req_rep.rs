// tests/req_rep.rs

use zmq_engine::options::LINGER;
use zmq_engine::{Msg, SocketType, ZmqError};
mod common;

use common::LONG_TIMEOUT;

#[tokio::test]
async fn test_req_rep_tcp_round_trip() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let rep = ctx.socket(SocketType::Rep)?;
  let req = ctx.socket(SocketType::Req)?;

  let endpoint = common::bind_resolve(&rep, "tcp://127.0.0.1:*").await?;
  req.connect(&endpoint).await?;

  for i in 0..3 {
    req.send(Msg::from(format!("request {}", i))).await?;
    let request = common::recv_timeout(&rep, LONG_TIMEOUT).await?;
    assert_eq!(request.data(), format!("request {}", i).as_bytes());
    assert!(!request.is_more(), "envelope must be stripped");

    rep.send(Msg::from(format!("reply {}", i))).await?;
    let reply = common::recv_timeout(&req, LONG_TIMEOUT).await?;
    assert_eq!(reply.data(), format!("reply {}", i).as_bytes());
  }
  ctx.terminate().await?;
  Ok(())
}

#[tokio::test]
async fn test_req_double_send_is_protocol_violation() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let rep = ctx.socket(SocketType::Rep)?;
  let req = ctx.socket(SocketType::Req)?;
  let endpoint = common::unique_inproc_endpoint();

  rep.bind(&endpoint).await?;
  req.connect(&endpoint).await?;

  assert!(matches!(req.try_recv(), Err(ZmqError::ProtocolViolation(_))));
  req.send(Msg::from("first")).await?;
  assert!(matches!(
    req.send(Msg::from("second")).await,
    Err(ZmqError::ProtocolViolation(_))
  ));
  assert!(matches!(
    rep.send(Msg::from("unasked")).await,
    Err(ZmqError::ProtocolViolation(_))
  ));
  ctx.terminate().await?;
  Ok(())
}

#[tokio::test]
async fn test_rep_serves_multiple_requesters() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let rep = ctx.socket(SocketType::Rep)?;
  let req_a = ctx.socket(SocketType::Req)?;
  let req_b = ctx.socket(SocketType::Req)?;
  let endpoint = common::unique_inproc_endpoint();

  rep.bind(&endpoint).await?;
  req_a.connect(&endpoint).await?;
  req_b.connect(&endpoint).await?;

  req_a.send(Msg::from("from a")).await?;
  req_b.send(Msg::from("from b")).await?;

  for _ in 0..2 {
    let request = common::recv_timeout(&rep, LONG_TIMEOUT).await?;
    let mut reply = b"echo ".to_vec();
    reply.extend_from_slice(request.data());
    rep.send(Msg::from_vec(reply)).await?;
  }

  assert_eq!(common::recv_timeout(&req_a, LONG_TIMEOUT).await?.data(), b"echo from a");
  assert_eq!(common::recv_timeout(&req_b, LONG_TIMEOUT).await?.data(), b"echo from b");
  ctx.terminate().await?;
  Ok(())
}

#[tokio::test]
async fn test_req_rep_multipart_request() -> anyhow::Result<()> {
  let ctx = common::test_context();
  let rep = ctx.socket(SocketType::Rep)?;
  let req = ctx.socket(SocketType::Req)?;
  let endpoint = common::unique_inproc_endpoint();

  rep.bind(&endpoint).await?;
  req.connect(&endpoint).await?;

  req.send_multipart(vec![Msg::from("part1"), Msg::from("part2")]).await?;
  let request = common::recv_multipart_timeout(&rep, LONG_TIMEOUT).await?;
  assert_eq!(
    common::frames_as_vecs(&request),
    vec![b"part1".to_vec(), b"part2".to_vec()]
  );
  rep.send_multipart(vec![Msg::from("ok"), Msg::from("done")]).await?;
  let reply = common::recv_multipart_timeout(&req, LONG_TIMEOUT).await?;
  assert_eq!(common::frames_as_vecs(&reply), vec![b"ok".to_vec(), b"done".to_vec()]);
  ctx.terminate().await?;
  Ok(())
}

/// REQ binds, REP connects, answers and goes away before REQ reads.
async fn reply_survives_departed_replier(bind_endpoint: &str) -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let req = ctx.socket(SocketType::Req)?;
  let endpoint = common::bind_resolve(&req, bind_endpoint).await?;

  let rep = ctx.socket(SocketType::Rep)?;
  rep.set_option(LINGER, 1000).await?;
  rep.connect(&endpoint).await?;

  req.send(Msg::from("last question")).await?;
  let request = common::recv_timeout(&rep, LONG_TIMEOUT).await?;
  assert_eq!(request.data(), b"last question");
  rep.send(Msg::from("last answer")).await?;
  rep.close();
  common::settle().await;

  let reply = common::recv_timeout(&req, LONG_TIMEOUT).await?;
  assert_eq!(reply.data(), b"last answer");
  ctx.terminate().await?;
  Ok(())
}

#[tokio::test]
async fn test_reply_survives_departed_replier_inproc() -> Result<(), ZmqError> {
  reply_survives_departed_replier(&common::unique_inproc_endpoint()).await
}

#[tokio::test]
async fn test_reply_survives_departed_replier_tcp() -> Result<(), ZmqError> {
  reply_survives_departed_replier("tcp://127.0.0.1:*").await
}
