mod support;

use std::sync::Arc;
use std::time::Duration;

use labelbridge::{FixtureFetcher, HostLoop, PrintRequest, PrinterRegistry, RequestMode};
use pretty_assertions::assert_eq;
use tokio::sync::oneshot;
use tokio::time::sleep;

use support::{RecordingTransport, ScriptedBus, png_bytes};

const UPDATE_PERIOD: Duration = Duration::from_secs(5);

struct Harness {
    bus: Arc<ScriptedBus>,
    probe: support::TransportProbe,
    stop: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<Result<(), labelbridge::TransportError>>,
}

fn start(printers: &[(&str, &str)]) -> Harness {
    start_with(printers, RecordingTransport::default())
}

fn start_with(printers: &[(&str, &str)], transport: RecordingTransport) -> Harness {
    let bus = Arc::new(ScriptedBus::default());
    bus.set_found(printers);
    let probe = transport.probe();
    let registry = PrinterRegistry::new(bus.clone(), Arc::new(FixtureFetcher::default()));
    let (stop, stopped) = oneshot::channel::<()>();

    let host = HostLoop::new(registry, Box::new(transport), "pi-01", UPDATE_PERIOD);
    let task = tokio::spawn(host.run_until(async move {
        let _ = stopped.await;
    }));

    Harness {
        bus,
        probe,
        stop,
        task,
    }
}

impl Harness {
    async fn stop(self) -> anyhow::Result<(Arc<ScriptedBus>, support::TransportProbe)> {
        let _ = self.stop.send(());
        self.task.await??;
        Ok((self.bus, self.probe))
    }
}

#[tokio::test(start_paused = true)]
async fn publishes_status_every_period() -> anyhow::Result<()> {
    let harness = start(&[("SN1", "/dev/usb/lp0")]);

    sleep(Duration::from_secs(11)).await;
    let (_bus, probe) = harness.stop().await?;

    let published = probe.published();
    assert_eq!(3, published.len());
    let latest = published.last().expect("at least one status");
    assert!(latest.online());
    assert_eq!("pi-01", latest.host());
    let serials: Vec<&str> = latest.printers().iter().map(|info| info.serial()).collect();
    assert_eq!(vec!["SN1"], serials);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn routes_request_to_addressed_printer() -> anyhow::Result<()> {
    let harness = start(&[("SN1", "/dev/usb/lp0"), ("SN2", "/dev/usb/lp1")]);
    sleep(Duration::from_secs(1)).await;

    harness
        .probe
        .deliver(PrintRequest::new("SN2", RequestMode::Png, png_bytes(32, 32)))
        .await;
    sleep(Duration::from_secs(1)).await;
    let (bus, _probe) = harness.stop().await?;

    assert_eq!(vec![(32, 32)], bus.counters("SN2").printed());
    assert!(bus.counters("SN1").printed().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn request_for_unknown_serial_is_dropped() -> anyhow::Result<()> {
    let harness = start(&[("SN1", "/dev/usb/lp0")]);
    sleep(Duration::from_secs(1)).await;

    harness
        .probe
        .deliver(PrintRequest::new("SN9", RequestMode::Png, png_bytes(32, 32)))
        .await;
    sleep(Duration::from_secs(1)).await;
    let (bus, _probe) = harness.stop().await?;

    assert!(bus.counters("SN1").printed().is_empty());
    assert!(bus.counters("SN9").printed().is_empty());
    assert_eq!(1, bus.attached());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_transport_and_releases_printers() -> anyhow::Result<()> {
    let harness = start(&[("SN1", "/dev/usb/lp0"), ("SN2", "/dev/usb/lp1")]);
    sleep(Duration::from_secs(1)).await;

    let (bus, probe) = harness.stop().await?;

    assert_eq!(1, probe.shutdowns());
    assert_eq!(1, bus.counters("SN1").disposals());
    assert_eq!(1, bus.counters("SN2").disposals());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_publishes_keep_the_cadence_and_routing() -> anyhow::Result<()> {
    let harness = start_with(
        &[("SN1", "/dev/usb/lp0")],
        RecordingTransport::rejecting_publishes(),
    );
    sleep(Duration::from_secs(6)).await;

    harness
        .probe
        .deliver(PrintRequest::new("SN1", RequestMode::Png, png_bytes(16, 16)))
        .await;
    sleep(Duration::from_secs(5)).await;
    let (bus, probe) = harness.stop().await?;

    assert_eq!(3, probe.published().len());
    assert_eq!(vec![(16, 16)], bus.counters("SN1").printed());
    Ok(())
}
