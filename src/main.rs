use bounded_pool::{Config, WorkerPool};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::runtime::Builder;
use tracing_subscriber::EnvFilter;

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::with_workers(3).name("demo").env_overrides()?;

    let rt = Builder::new_multi_thread().enable_all().build()?;

    rt.block_on(async {
        let now = Instant::now();
        println!("start time: {:.0}", unix_now());

        WorkerPool::scoped(config, |pool| async move {
            for secs in [9, 2, 5, 6] {
                pool.spawn_blocking(move || {
                    std::thread::sleep(Duration::from_secs(secs));
                    println!("waited {secs} seconds, time: {:.0}", unix_now());
                })?;
            }
            println!("all tasks submitted");
            Ok::<_, bounded_pool::PoolError>(())
        })
        .await??;

        println!("all tasks done, elapsed: {:?}", now.elapsed());
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
