use super::{Segment, SegmentIo, SegmentRegistry};
use async_trait::async_trait;

/// Forwards every record untouched.
pub struct Pass;

#[async_trait]
impl Segment for Pass {
    fn name(&self) -> &str {
        "pass"
    }

    async fn run(self: Box<Self>, mut io: SegmentIo) {
        io.log_started();
        while let Some(record) = io.input.recv().await {
            if io.output.forward(record).await.is_err() {
                break;
            }
        }
        io.log_stopped();
    }
}

pub fn register(registry: &mut SegmentRegistry) {
    registry.register("pass", |_| Ok(Pass));
}
