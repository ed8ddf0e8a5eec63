fn main() {
    use vergen::{BuildBuilder, Emitter};

    // VERGEN_BUILD_TIMESTAMP feeds `wscreen --version`.
    let mut emitter = Emitter::default();
    if let Ok(build) = BuildBuilder::all_build() {
        let _ = emitter.add_instructions(&build);
    }

    if let Err(e) = emitter.emit() {
        eprintln!("vergen emit skipped: {e}");
    }
}
