use netsession::http::Handled;
use netsession::{Middleware, Next, Request, RetryPolicy, Session};
use std::time::{Duration, Instant};

/// Logs each call with its duration.
struct Timing;

impl Middleware for Timing {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> Handled<'a> {
        Box::pin(async move {
            let started = Instant::now();
            let target = req.resolved_url().map(ToString::to_string).unwrap_or_default();
            let res = next.run(req).await;
            match &res {
                Ok(resp) => println!("{} -> {} in {:?}", target, resp.status(), started.elapsed()),
                Err(e) => println!("{} -> error {} in {:?}", target, e, started.elapsed()),
            }
            res
        })
    }
}

/// Adds an API key to every request.
struct ApiKey(&'static str);

impl Middleware for ApiKey {
    fn handle<'a>(&'a self, mut req: Request, next: Next<'a>) -> Handled<'a> {
        if let Ok(value) = self.0.parse() {
            req.headers_mut().insert("x-api-key", value);
        }
        next.run(req)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::new();
    session
        .with_base_url("https://httpbin.org")
        .with_middleware(Timing)
        .with_middleware(ApiKey("demo-key"))
        .with_retry(
            RetryPolicy::default()
                .with_max_attempts(4)
                .with_backoff(Duration::from_millis(200), Duration::from_secs(2), 2.0)
                .with_jitter(0.2)
                .retry_server_errors(),
        );

    // Timing sees one call; the retries happen inside it
    let resp = session.get("/status/503").send().await?;
    println!("Final status after retries: {}", resp.status());

    let resp = session.get("/anything").send().await?;
    println!("{}", resp.text()?);
    Ok(())
}
