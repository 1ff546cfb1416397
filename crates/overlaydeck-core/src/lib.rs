//! OverlayDeck Core Library
//!
//! Platform-agnostic engine for stream overlay widgets: normalized
//! transforms, drag/scale/rotate gestures with rotation snapping, rigid
//! widget groups, saved layouts, and synchronization between the control
//! window and any number of display windows.

pub mod config;
pub mod engine;
pub mod gesture;
pub mod group;
pub mod layout;
pub mod overlay;
pub mod snap;
pub mod storage;
pub mod store;
pub mod surface;
pub mod sync;
pub mod transform;

pub use config::{EngineConfig, WindowRole};
pub use engine::{OverlayEngine, PumpReport};
pub use gesture::{GestureController, GestureScope, GestureState, LiveTransforms};
pub use group::{GroupId, RelativeTransform, WidgetGroup};
pub use layout::{Layout, LayoutId, LayoutImportError, LayoutWidget};
pub use overlay::{SelectionBounds, SelectionOverlay};
pub use snap::{RotationSnap, snap_rotation};
pub use storage::{MemoryStorage, PersistScheduler, Storage, StorageError};
pub use store::{ChangeOrigin, StoreEvent, StoreSnapshot, TransformStore};
pub use surface::{FrameHandle, FrameScheduler, RectSource, RenderSink};
pub use sync::{BroadcastTransport, ConnectionState, MemoryBus, SyncMessage, WindowId, WindowSync};
pub use transform::{PartialTransform, Viewport, WidgetId, WidgetTransform};
