use netsession::cookies::MemoryCookieJar;
use netsession::Session;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // One session, configured once, reused for every call
    let jar = Arc::new(MemoryCookieJar::new());
    let session = Session::new();
    session
        .with_base_url("https://httpbin.org")
        .with_timeout(Duration::from_secs(15))
        .with_header("Accept", "application/json")
        .with_cookie_jar(jar.clone());

    // Relative URL resolved against the base URL
    let resp = session.get("/cookies/set").query("flavor", "oatmeal").send().await?;
    println!("Status: {}", resp.status());
    println!("Cookies stored: {}", jar.total_cookie_count());

    // Session headers and request headers are both sent
    let resp = session.get("/headers").header("X-Request-Id", "demo-1").send().await?;
    println!("{}", resp.text()?);

    // JSON round trip
    let echoed: serde_json::Value =
        session.post_json("/post", &serde_json::json!({ "name": "widget" })).await?;
    println!("Server saw: {}", echoed["json"]);

    session.close();
    Ok(())
}
