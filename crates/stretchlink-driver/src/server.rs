//! Binds every driver endpoint and spawns its service.
//!
//! | Endpoint | Role | Bus traffic |
//! |---|---|---|
//! | status | publisher | `[ts, Status]` |
//! | command | subscriber | `manipulator`, `base` |
//! | servo | subscriber | `servo` |
//! | goto | reply | n/a |
//! | tts | subscriber | text to speak |
//! | asr | reply | n/a |
//! | one per camera | publisher | camera frames |
//!
//! The speech endpoints are only bound when a speech backend is supplied
//! in [`Peripherals`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use parking_lot::Mutex;
use stretchlink_hal::Camera;
use stretchlink_middleware::{Endpoint, MessageBus};
use stretchlink_types::{BaseCommand, ManipulatorCommand, ServoCommand, ValidationMode};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::controller::SharedController;
use crate::dispatcher::Dispatcher;
use crate::services;
use crate::speech::{self, SpeechInput, SpeechOutput};

#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub status_port: u16,
    pub command_port: u16,
    pub servo_port: u16,
    pub goto_port: u16,
    pub tts_port: u16,
    pub asr_port: u16,
    pub status_period: Duration,
    pub bus_capacity: usize,
    pub mode: ValidationMode,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            status_port: 5555,
            command_port: 5556,
            servo_port: 5557,
            goto_port: 5558,
            tts_port: 6101,
            asr_port: 6102,
            status_period: Duration::from_millis(20),
            bus_capacity: 16,
            mode: ValidationMode::Strict,
        }
    }
}

/// A camera and the port its frames are published on.
pub struct CameraBinding {
    pub camera: Box<dyn Camera>,
    pub port: u16,
}

/// Optional devices served next to the robot itself.
#[derive(Default)]
pub struct Peripherals {
    pub cameras: Vec<CameraBinding>,
    pub speech_output: Option<SpeechOutput>,
    pub speech_input: Option<SpeechInput>,
}

/// Addresses the endpoints actually bound to.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundAddrs {
    pub status: SocketAddr,
    pub command: SocketAddr,
    pub servo: SocketAddr,
    pub goto: SocketAddr,
    pub tts: Option<SocketAddr>,
    pub asr: Option<SocketAddr>,
    pub cameras: Vec<(String, SocketAddr)>,
}

/// Handles of the running services.
pub struct RunningServer {
    pub addrs: BoundAddrs,
    tasks: Vec<JoinHandle<()>>,
    camera_threads: Vec<std::thread::JoinHandle<()>>,
}

impl RunningServer {
    /// Abort the async services and wait for the camera threads, which
    /// exit once the shared shutdown flag is set.
    pub fn stop(self) {
        for task in &self.tasks {
            task.abort();
        }
        for thread in self.camera_threads {
            if thread.join().is_err() {
                tracing::error!("camera thread panicked");
            }
        }
        debug!("driver services stopped");
    }
}

/// Bind all endpoints, then start every service.
///
/// Must be called inside a Tokio runtime.  Nothing is spawned if any bind
/// fails.
///
/// # Errors
///
/// [`stretchlink_types::LinkError::Transport`] if an endpoint cannot be
/// bound.
pub async fn serve(
    controller: SharedController,
    settings: &ServerSettings,
    peripherals: Peripherals,
    shutdown: Arc<AtomicBool>,
) -> Result<RunningServer, stretchlink_types::LinkError> {
    let Peripherals {
        cameras,
        speech_output,
        speech_input,
    } = peripherals;
    let host = settings.host.as_str();
    let status_ep = Endpoint::bind((host, settings.status_port)).await?;
    let command_ep = Endpoint::bind((host, settings.command_port)).await?;
    let servo_ep = Endpoint::bind((host, settings.servo_port)).await?;
    let goto_ep = Endpoint::bind((host, settings.goto_port)).await?;
    let tts_ep = match speech_output {
        Some(output) => Some((output, Endpoint::bind((host, settings.tts_port)).await?)),
        None => None,
    };
    let asr_ep = match speech_input {
        Some(input) => Some((input, Endpoint::bind((host, settings.asr_port)).await?)),
        None => None,
    };
    let mut camera_eps = Vec::with_capacity(cameras.len());
    for binding in cameras {
        let endpoint = Endpoint::bind((host, binding.port)).await?;
        camera_eps.push((binding.camera, endpoint));
    }

    let addrs = BoundAddrs {
        status: status_ep.local_addr(),
        command: command_ep.local_addr(),
        servo: servo_ep.local_addr(),
        goto: goto_ep.local_addr(),
        tts: tts_ep.as_ref().map(|(_, ep)| ep.local_addr()),
        asr: asr_ep.as_ref().map(|(_, ep)| ep.local_addr()),
        cameras: camera_eps
            .iter()
            .map(|(camera, ep)| (camera.name().to_string(), ep.local_addr()))
            .collect(),
    };

    let mut tasks = Vec::new();

    // status
    let status_bus = MessageBus::new(settings.bus_capacity);
    tasks.push(tokio::spawn(status_ep.serve_publisher(status_bus.clone())));
    tasks.push(tokio::spawn(services::run_status_publisher(
        Arc::clone(&controller),
        status_bus,
        settings.status_period,
    )));

    // command
    let command_bus = MessageBus::new(settings.bus_capacity);
    let commands = Arc::new(command_dispatcher(&controller, settings.mode));
    let subscription = command_bus.subscribe(&commands.topics());
    tasks.push(tokio::spawn(commands.run(subscription)));
    tasks.push(tokio::spawn(command_ep.serve_subscriber(command_bus)));

    // servo
    let servo_bus = MessageBus::new(settings.bus_capacity);
    let servo = Arc::new(servo_dispatcher(&controller, settings.mode));
    let subscription = servo_bus.subscribe(&servo.topics());
    tasks.push(tokio::spawn(servo.run(subscription)));
    tasks.push(tokio::spawn(servo_ep.serve_subscriber(servo_bus)));

    // goto
    let goto_controller = Arc::clone(&controller);
    let mode = settings.mode;
    tasks.push(tokio::spawn(goto_ep.serve_reply(move |request| {
        services::handle_goto_request(Arc::clone(&goto_controller), mode, request)
    })));

    // speech
    if let Some((output, endpoint)) = tts_ep {
        let bus = MessageBus::new(settings.bus_capacity);
        tasks.push(tokio::spawn(speech::run_speak_service(output, bus.subscribe_all())));
        tasks.push(tokio::spawn(endpoint.serve_subscriber(bus)));
    }
    if let Some((input, endpoint)) = asr_ep {
        let input = Arc::new(Mutex::new(input));
        tasks.push(tokio::spawn(endpoint.serve_reply(move |request| {
            speech::handle_listen_request(Arc::clone(&input), request)
        })));
    }

    // cameras
    let mut camera_threads = Vec::new();
    for (camera, endpoint) in camera_eps {
        let bus = MessageBus::new(settings.bus_capacity);
        tasks.push(tokio::spawn(endpoint.serve_publisher(bus.clone())));
        let flag = Arc::clone(&shutdown);
        camera_threads.push(std::thread::spawn(move || services::run_camera(camera, bus, flag)));
    }

    info!(
        status = %addrs.status,
        command = %addrs.command,
        servo = %addrs.servo,
        goto = %addrs.goto,
        speech = addrs.tts.is_some() || addrs.asr.is_some(),
        cameras = addrs.cameras.len(),
        "driver services started"
    );
    Ok(RunningServer {
        addrs,
        tasks,
        camera_threads,
    })
}

/// `manipulator` and `base` topics.
pub fn command_dispatcher(controller: &SharedController, mode: ValidationMode) -> Dispatcher {
    let manipulator = Arc::clone(controller);
    let base = Arc::clone(controller);
    Dispatcher::new(mode)
        .route("manipulator", move |command: ManipulatorCommand| {
            let outcome = manipulator.lock().execute_manipulator_command(&command)?;
            debug!(?outcome, "manipulator command");
            Ok(())
        })
        .route("base", move |command: BaseCommand| {
            let outcome = base.lock().execute_base_command(&command)?;
            debug!(?outcome, "base command");
            Ok(())
        })
}

/// `servo` topic.
pub fn servo_dispatcher(controller: &SharedController, mode: ValidationMode) -> Dispatcher {
    let servo = Arc::clone(controller);
    Dispatcher::new(mode).route("servo", move |command: ServoCommand| {
        let outcome = servo.lock().servo(&command)?;
        debug!(?outcome, "servo command");
        Ok(())
    })
}
