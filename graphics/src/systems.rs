mod buffer;
mod device;
mod layout;
mod pipelines;
mod renderer;
mod system;
mod textures;

pub use buffer::{Buffer, BufferData, BufferLayout};
pub use device::GpuDevice;
pub use layout::*;
pub use pipelines::*;
pub use renderer::*;
pub use system::*;
pub use textures::*;

pub(crate) use ahash::{AHashMap, AHashSet, AHasher};

pub(crate) type ABuildHasher = std::hash::BuildHasherDefault<AHasher>;
pub(crate) type AIndexSet<K> = indexmap::IndexSet<K, ABuildHasher>;
pub(crate) type AIndexMap<K, V> = indexmap::IndexMap<K, V, ABuildHasher>;
