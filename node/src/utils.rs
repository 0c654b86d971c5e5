//! Small support utilities with no dependency on the component layer.

pub mod work_queue;
