use anyhow::Result;
use async_trait::async_trait;
use bootseq::{BootConfig, BootStep, Coordinator, Done, Step, StepReturn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

// Shared application state filled in by the boot steps
#[derive(Default, Debug)]
struct App {
    settings: Mutex<Vec<(String, String)>>,
    connections: Mutex<usize>,
    routes: Mutex<Vec<&'static str>>,
}

struct ConnectPool {
    size: usize,
}

#[async_trait]
impl BootStep<App> for ConnectPool {
    fn name(&self) -> &str {
        "connect-pool"
    }

    async fn run(&self, app: Arc<App>) -> Result<()> {
        for _ in 0..self.size {
            tokio::time::sleep(Duration::from_millis(20)).await;
            *app.connections.lock() += 1;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let config = BootConfig::from_yaml_str(include_str!("../boot.yaml"))?;
    let boot = Coordinator::with_config(App::default(), config);

    boot.register(
        Step::sync(|app: &App| {
            app.settings
                .lock()
                .push(("listen".to_string(), "0.0.0.0:8080".to_string()));
            Ok(())
        })
        .named("settings"),
    )
    .register(Step::from_boot_step(Arc::new(ConnectPool { size: 3 })))
    .register(
        Step::callback(|app: Arc<App>, done: Done| {
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                app.routes.lock().extend(["/health", "/users"]);
                done.ok();
            });
        })
        .named("routes"),
    )
    .register(
        Step::deferred(|app: Arc<App>| {
            if app.routes.lock().is_empty() {
                return StepReturn::pending(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(())
                });
            }
            StepReturn::ready()
        })
        .named("warmup"),
    );

    let completion = boot.wait().await?;
    match completion.error {
        Some(err) => println!("boot failed: {}", err),
        None => println!("booted: {:#?}", completion.context),
    }
    println!("{}", boot.stats().to_json()?);

    Ok(())
}
