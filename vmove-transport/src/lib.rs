mod host;
mod packets;
mod remote;
#[cfg(test)]
mod tests;

pub use host::ProviderHost;
pub use packets::{ProviderRequest, ProviderResponse, read_frame, write_frame};
pub use remote::RemoteSink;

use interprocess::local_socket::{GenericNamespaced, Name, ToNsName};

use vmove_logic::prelude::*;

pub fn get_socket_name(base_name: String) -> Result<Name<'static>> {
    base_name
        .to_ns_name::<GenericNamespaced>()
        .context("Failed to parse socket name")
}
