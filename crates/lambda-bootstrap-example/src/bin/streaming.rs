//! Streaming handler emitting server-sent events.
//!
//! Rename the built binary to `bootstrap` when packaging; the function must
//! also be configured for response streaming on the Lambda side.

use lambda_bootstrap::HandlerError;

fn main() {
    let error = lambda_bootstrap::run_streaming(|ctx, event, stream| {
        if event.is_empty() {
            // Failing before `open` reports through the error endpoint.
            return Err(HandlerError::new("BadInput", "empty event"));
        }

        stream.open("text/event-stream")?;
        stream.publish_fmt(format_args!("data: request {}\n\n", ctx.request_id()))?;
        for n in 1..=3 {
            stream.publish_fmt(format_args!("data: tick {n}\n\n"))?;
        }
        stream.publish(b"data: done\n\n")?;
        Ok(())
    });

    eprintln!("runtime exited: {error}");
    std::process::exit(1);
}
