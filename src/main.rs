use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use marketsim::{Config, Generator, OrderBook, Publisher, Stats, TransportServer};
use tracing::{error, info};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::default();
    info!(symbol = %config.symbol, base_price = config.base_price, "starting engine");

    let book = Arc::new(Mutex::new(OrderBook::new(
        config.symbol.clone(),
        config.initial_order_capacity,
    )));
    let stats = Arc::new(Stats::new(config.base_price));

    let mut generator = Generator::new(book.clone(), stats.clone(), config.base_price);
    generator.start(config.target_orders_per_second);

    let mut transport = TransportServer::new(config.transport_port);
    if !transport.start() {
        error!(port = config.transport_port, "transport setup failed, aborting startup");
        generator.stop();
        return;
    }
    let transport = Arc::new(transport);

    let mut publisher = Publisher::new(
        book.clone(),
        stats.clone(),
        transport.clone(),
        config.broadcast_interval_ms,
    );
    publisher.start();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        shutdown_handler.store(true, Ordering::SeqCst);
    }) {
        error!(error = %e, "failed to install SIGINT handler");
    }

    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }

    info!("shutting down");
    publisher.stop();
    drop(publisher);
    generator.stop();
    drop(generator);

    match Arc::into_inner(transport) {
        Some(mut transport) => transport.stop(),
        None => error!("transport still has outstanding references at shutdown"),
    }

    info!("shutdown complete");
}
