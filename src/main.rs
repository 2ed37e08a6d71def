use midistation::midi::device::{
    DeviceError, LiveInput, MidiPortInfo, MidirSink, list_input_ports, list_output_ports,
};
use midistation::{
    Command, PlaybackController, Scheduler, StationConfig, Status, create_command_channel,
    create_live_channel, create_notification_channel,
};
use ringbuf::traits::{Consumer, Producer};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: midistation <file.mid> [config.ron]";

/// Show what is available when a configured port name matched nothing
fn print_ports(kind: &str, ports: Result<Vec<MidiPortInfo>, DeviceError>) {
    match ports {
        Ok(ports) if ports.is_empty() => eprintln!("No MIDI {} ports", kind),
        Ok(ports) => {
            eprintln!("Available MIDI {} ports:", kind);
            for port in ports {
                eprintln!("  {}: {}", port.index, port.name);
            }
        }
        Err(e) => eprintln!("Cannot list MIDI {} ports: {}", kind, e),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("midistation=info")),
        )
        .init();

    let mut args = std::env::args_os().skip(1);
    let Some(file) = args.next().map(PathBuf::from) else {
        eprintln!("{}", USAGE);
        return ExitCode::FAILURE;
    };

    let config = match args.next().map(PathBuf::from).or_else(StationConfig::default_path) {
        Some(path) => match StationConfig::load_or_default(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("ERROR: {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => StationConfig::default(),
    };

    println!("=== MIDI Station ===");

    let sink = match MidirSink::connect(config.ports.output.as_deref()) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            if matches!(e, DeviceError::NoPort(_)) {
                print_ports("OUT", list_output_ports());
            }
            return ExitCode::FAILURE;
        }
    };
    println!("MIDI OUT: {}", sink.port_name());

    let (live_tx, live_rx) = create_live_channel(config.live_ring_capacity);
    // Keep the connection alive for the whole session
    let live_input = match LiveInput::connect(config.ports.input.as_deref(), live_tx) {
        Ok(Some(input)) => {
            println!("MIDI IN: {}", input.port_name());
            Some(input)
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = %e, "live input unavailable");
            if matches!(e, DeviceError::NoPort(_)) {
                print_ports("IN", list_input_ports());
            }
            None
        }
    };

    let (mut command_tx, command_rx) = create_command_channel(config.command_ring_capacity);
    let (notification_tx, mut notification_rx) =
        create_notification_channel(config.notification_ring_capacity);

    let controller = PlaybackController::from_config(&config, sink)
        .with_notifications(notification_tx)
        .with_live_input(live_rx);
    let scheduler = Scheduler::new(
        controller,
        command_rx,
        Duration::from_micros(config.tick_micros),
    );
    let handle = match scheduler.spawn() {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("ERROR: cannot start scheduler: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _ = command_tx.try_push(Command::SetMasterVolume(config.master_volume));
    let _ = command_tx.try_push(Command::Open(file));
    let _ = command_tx.try_push(Command::Play);

    let mut code = ExitCode::SUCCESS;
    'session: loop {
        while let Some(notification) = notification_rx.try_pop() {
            println!("[{:?}] {:?}", notification.level(), notification.status);
            match notification.status {
                Status::Stopped(_) => break 'session,
                Status::OpenFailed(_) => {
                    code = ExitCode::FAILURE;
                    break 'session;
                }
                _ => {}
            }
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    let _ = command_tx.try_push(Command::Quit);
    if handle.join().is_err() {
        eprintln!("ERROR: scheduler thread panicked");
        return ExitCode::FAILURE;
    }
    if let Some(dropped) = live_input.as_ref().map(LiveInput::dropped).filter(|&n| n > 0) {
        tracing::warn!(dropped, "live input events lost to a full ring");
    }
    code
}
