#[macro_use]
extern crate log;

use bearmon_core::alert::NullAlertBackend;
use bearmon_core::config::{Config, Role};
use bearmon_core::controller::Controller;
use bearmon_core::probe::NullProbe;
use bearmon_core::store::MemStore;
use bearmon_core::worker::Worker;
use clap::Parser;
use std::fs;
use std::process;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "bearmon", about = "Distributed uptime-monitoring coordination plane", version)]
struct Opts {
    /// Config file path.
    path: String,
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let opts = Opts::parse();
    let config_str = fs::read_to_string(&opts.path).unwrap_or_else(|e| {
        eprintln!("error reading configuration file {}: {e}", opts.path);
        process::exit(1);
    });
    let config = Config::parse(&config_str).unwrap_or_else(|e| {
        eprintln!("configuration error: {e}");
        process::exit(1);
    });

    match config.role() {
        Ok(Role::Controller(controller_config)) => {
            // The store and probe/alert backends are external collaborators;
            // this binary wires in in-memory/no-op stand-ins so the
            // coordination plane runs standalone.
            let store = Arc::new(MemStore::new());
            let alerts = Arc::new(NullAlertBackend::default());
            let controller =
                Controller::new(controller_config, config.default.password.clone(), config.default.debug, store, alerts);

            // A controller process always runs a co-located worker too, so
            // every check has somewhere to be probed from, sharing the
            // controller reference directly rather than dialing itself
            // over TCP.
            if let Some(worker_config) = &config.worker {
                let worker = Worker::new(
                    worker_config.clone(),
                    config.default.password.clone(),
                    Some(controller.clone()),
                    Arc::new(NullProbe::always_online()),
                );
                worker.start();
            } else {
                warn!("controller: no [worker] section configured; running without a co-located worker");
            }

            if let Err(e) = controller.start(controller_config.addr).await {
                error!("controller: fatal error: {e}");
                process::exit(1);
            }
        }
        Ok(Role::ViewServer(view_server_config)) => {
            let view_server = bearmon_core::viewserver::ViewServer::new(view_server_config);
            if let Err(e) = view_server.start(view_server_config.addr).await {
                error!("viewserver: fatal error: {e}");
                process::exit(1);
            }
        }
        Err(e) => {
            error!("error: {e}");
            process::exit(1);
        }
    }
}
