mod credentials;
mod io;
mod types;

pub use credentials::{Credentials, load_credentials, normalize_base_url, parse_credentials};
pub use io::{read_json_file, write_json_file};
pub use types::WatchSettings;
