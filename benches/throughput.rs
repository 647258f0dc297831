// benches/throughput.rs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use zmq_engine::options::{LAST_ENDPOINT, RCVHWM, SNDHWM};
use zmq_engine::{Context, Msg, Socket, SocketType, ZmqError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::time::timeout;

const NUM_MESSAGES: usize = 10_000;
const SETUP_TIMEOUT: Duration = Duration::from_secs(5);
const BENCH_HWM: i32 = 100_000;

async fn setup_push_pull(ctx: &Context, bind_addr: &str) -> Result<(Socket, Socket), ZmqError> {
  let push = ctx.socket(SocketType::Push)?;
  let pull = ctx.socket(SocketType::Pull)?;
  push.set_option(SNDHWM, BENCH_HWM).await?;
  pull.set_option(RCVHWM, BENCH_HWM).await?;

  pull.bind(bind_addr).await?;
  let endpoint = String::from_utf8(pull.get_option(LAST_ENDPOINT).await?)
    .map_err(|_| ZmqError::Internal("LAST_ENDPOINT is not UTF-8".into()))?;
  push.connect(&endpoint).await?;

  // One round trip proves the connection is up before timing starts.
  push.send(Msg::from("warmup")).await?;
  pull.recv().await?;
  Ok((push, pull))
}

async fn run_transfer(push: Arc<Socket>, pull: Arc<Socket>, msg_size: usize) -> Result<(), ZmqError> {
  let payload = vec![0u8; msg_size];
  let sender = tokio::spawn(async move {
    for _ in 0..NUM_MESSAGES {
      push.send(Msg::from_vec(black_box(payload.clone()))).await?;
    }
    Ok::<_, ZmqError>(())
  });
  for _ in 0..NUM_MESSAGES {
    let msg = pull.recv().await?;
    black_box(msg.data());
  }
  sender
    .await
    .map_err(|e| ZmqError::Internal(format!("sender task failed: {}", e)))?
}

fn push_pull_throughput(c: &mut Criterion, transport: &str, bind_addr: &'static str) {
  let rt = Runtime::new().expect("Failed to create Tokio runtime");
  let mut group = c.benchmark_group(format!("PUSH_PULL_{}_Throughput", transport));

  for size in [16usize, 256, 1024, 4096, 16384] {
    group.throughput(Throughput::Bytes((NUM_MESSAGES * size) as u64));
    group.bench_with_input(BenchmarkId::from_parameter(format!("{}B", size)), &size, |b, &msg_size| {
      b.to_async(&rt).iter_custom(|iters| async move {
        let ctx = Context::new().expect("Bench context creation failed");
        let (push, pull) = match timeout(SETUP_TIMEOUT, setup_push_pull(&ctx, bind_addr)).await {
          Ok(Ok(sockets)) => sockets,
          Ok(Err(e)) => panic!("Bench socket setup failed: {}", e),
          Err(_) => panic!("Bench socket setup timed out"),
        };
        let (push, pull) = (Arc::new(push), Arc::new(pull));

        let start = Instant::now();
        for _ in 0..iters {
          run_transfer(push.clone(), pull.clone(), msg_size)
            .await
            .expect("Transfer failed");
        }
        let elapsed = start.elapsed();

        drop((push, pull));
        ctx.terminate().await.expect("Context termination failed");
        elapsed
      });
    });
  }
  group.finish();
}

fn push_pull_tcp(c: &mut Criterion) {
  push_pull_throughput(c, "TCP", "tcp://127.0.0.1:*");
}

fn push_pull_inproc(c: &mut Criterion) {
  push_pull_throughput(c, "INPROC", "inproc://bench-throughput");
}

criterion_group! {
  name = benches;
  config = Criterion::default().sample_size(10).measurement_time(Duration::from_secs(10));
  targets = push_pull_tcp, push_pull_inproc
}
criterion_main!(benches);
