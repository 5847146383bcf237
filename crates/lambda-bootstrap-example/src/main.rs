//! Buffered echo handler.
//!
//! Deployed as-is: Lambda execs the binary because it is named `bootstrap`.
//! The handler echoes the event back, wrapped in a small JSON envelope built
//! in the per-invocation arena.

use lambda_bootstrap::HandlerError;

fn main() {
    let error = lambda_bootstrap::run_buffered(|ctx, event| {
        log::info!(
            "handling {} byte event for {}",
            event.len(),
            ctx.config().function_name
        );

        let body = std::str::from_utf8(event)
            .map_err(|_| HandlerError::new("BadInput", "event is not UTF-8"))?;

        // Scratch copy lives in the arena and vanishes with the invocation;
        // the returned envelope is an ordinary owned value.
        let trimmed = ctx.arena().alloc_str(body.trim());
        let envelope = serde_json::json!({
            "functionArn": ctx.invoked_function_arn(),
            "remainingMs": ctx.remaining_time().as_millis() as u64,
            "echo": trimmed,
        });
        Ok(envelope.to_string().into_bytes())
    });

    eprintln!("runtime exited: {error}");
    std::process::exit(1);
}
