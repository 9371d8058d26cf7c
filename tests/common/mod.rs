#![allow(dead_code)]

pub mod fixtures;

use fixtures::{FixtureFactory, FixtureModules, format_assets};
use quire::{Controller, SessionBuilder};
use std::sync::Arc;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// A started session compiling with `factory`.
pub fn session_with(factory: Arc<FixtureFactory>) -> Controller {
    builder_with(factory)
        .start()
        .expect("fixture session should start")
}

/// A builder wired to the fixture engine and an in-memory format blob.
pub fn builder_with(factory: Arc<FixtureFactory>) -> SessionBuilder {
    SessionBuilder::new()
        .with_build_id("test-build")
        .with_engine_modules(Arc::new(FixtureModules::new(factory)))
        .with_assets(format_assets())
}

pub fn session() -> (Controller, Arc<FixtureFactory>) {
    let factory = Arc::new(FixtureFactory::default());
    (session_with(Arc::clone(&factory)), factory)
}

/// Compiles and waits for the terminal event.
pub async fn compile(controller: &mut Controller) -> Option<u64> {
    let id = controller.run_compile();
    controller.wait_idle().await;
    id
}
