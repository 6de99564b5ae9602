use crate::LocationSource;
use crate::platform::LocationPlatform;
use crate::test_helper::ScriptedPlatform;
use std::sync::Arc;

const TIMEOUT_MS: u16 = 100;

fn scripted_source() -> (Arc<ScriptedPlatform>, LocationSource) {
    let platform = Arc::new(ScriptedPlatform::new());
    let source = LocationSource::new(Arc::clone(&platform) as Arc<dyn LocationPlatform>);
    (platform, source)
}

pub mod test_source;
pub mod test_stream;
