mod painter;
mod printer_view;
mod table;

pub(crate) use self::painter::Painter;
pub(crate) use self::printer_view::{FoundPrintersView, PrinterStatusView};
pub(crate) use self::table::Table;
