mod backend;
mod bus;
mod device;
mod discovery;
mod fake_backend;
mod job;
mod mock;
mod printer;

pub use self::backend::{KernelLpBackend, PrinterBackend};
pub use self::bus::{
    DEFAULT_MOCK_PRINTERS, FoundPrinter, KernelBus, MockBus, MockFixture, PrinterBus,
};
pub use self::device::{DeviceTiming, PrinterDevice};
pub use self::fake_backend::{FakeBackend, FakeBackendConfig, FakeBackendProbe, FakeReply};
pub use self::job::{JobOutcome, JobState};
pub use self::mock::MockPrinter;
pub use self::printer::{Printer, PrinterInfo};
