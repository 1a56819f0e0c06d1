pub mod connectivity;
pub mod device;
pub mod paths;
pub mod secure_storage;

pub use connectivity::{ConnectivityProbe, ManualProbe, NetworkState, TcpProbe};
pub use device::DeviceInfo;
pub use paths::AppPaths;
pub use secure_storage::{CredentialStore, KeyringStore, MemoryStore};
