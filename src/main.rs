/// Entry point of the cgwatch collector.
///
/// Mirrors the cgroup v1 hierarchies of the host, collects their stats and
/// serves them over HTTP until interrupted.
///
/// # Errors
///
/// Returns an error if initialization fails (e.g., invalid configuration or a
/// requested subsystem that is not mounted).
///
/// # Examples
///
/// ```bash
/// RUST_LOG=info CGWATCH_CGROUPS=cpu,cpuacct,memory cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    cgwatch::run().await
}
