mod progress;
mod spinner;
mod status;
mod table;

pub use progress::{renderer, ProgressMode};
pub use spinner::with_spinner;
pub use status::{print_command_status, CommandStatus};
pub use table::{apply_column_padding, header, styled_table};
