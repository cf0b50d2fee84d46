fn main() {
    env_logger::init();

    #[cfg(target_os = "macos")]
    {
        use std::path::PathBuf;
        use std::time::Duration;

        use video_stream::pipeline::PipelineObserver;
        use video_stream::platform::macos::{MetalTexture, PlaybackSession};
        use video_stream::types::PipelineState;

        struct PrintingObserver;

        impl PipelineObserver<MetalTexture> for PrintingObserver {
            fn on_frame(&mut self, textures: &[MetalTexture], timestamp_seconds: f64) {
                println!(
                    "frame at {timestamp_seconds:.3}s ({} texture(s))",
                    textures.len()
                );
            }

            fn on_state_change(
                &mut self,
                state: PipelineState,
                error: Option<&video_stream::error::Error>,
            ) {
                match error {
                    Some(e) => println!("state: {state} ({e})"),
                    None => println!("state: {state}"),
                }
            }
        }

        let path: PathBuf = match std::env::args_os().nth(1) {
            Some(arg) => arg.into(),
            None => {
                eprintln!("usage: playback <video-file>");
                return;
            }
        };

        let mut session = PlaybackSession::with_default_device(Box::new(PrintingObserver))
            .expect("no Metal device available");

        let profile = session.configure(&path).expect("failed to configure");
        println!(
            "playing {} at {:.2} fps",
            path.display(),
            profile.frames_per_second()
        );

        session.start().expect("failed to start");

        while session.state() == PipelineState::Running {
            std::thread::sleep(Duration::from_millis(100));
        }

        println!(
            "done: {} frame(s) delivered, {} dropped",
            session.frames_delivered(),
            session.frames_dropped()
        );
    }

    #[cfg(not(target_os = "macos"))]
    {
        println!("This example only works on macOS.");
    }
}
