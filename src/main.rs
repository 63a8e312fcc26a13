use std::io::{self, BufRead, Write};

use chatline::app::{App, Mode};
use chatline::providers;
use chatline::render::{SnapshotSink, StdoutRenderer};
use chatline::runtime::TurnController;
use tracing_subscriber::EnvFilter;

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let provider = providers::provider_from_env().map_err(io::Error::other)?;
    let profile = provider.profile();
    eprintln!(
        "chatline: provider '{}' model '{}'",
        profile.provider_id, profile.model_id
    );

    let (controller, events) = TurnController::new(provider);
    let mut host = controller.clone();
    let mut app = App::new();
    let mut renderer = StdoutRenderer::new(io::stdout());
    renderer.on_snapshot(&app.log().snapshot());

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    while !app.should_exit {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        app.on_input_replace(line?);
        app.on_submit(&mut host, &mut renderer);

        // Drain lifecycle events until the started turn reaches a terminal
        // state; the pipeline below the provider is strictly sequential.
        while matches!(app.mode, Mode::Streaming { .. }) {
            let Ok(event) = events.recv() else {
                break;
            };
            let terminal = event.is_terminal();
            let turn_id = event.turn_id();
            app.apply_turn_event(event, &mut renderer);
            if terminal {
                controller.finish_turn(turn_id);
            }
        }
    }

    Ok(())
}
