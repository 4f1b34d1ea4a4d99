//! Native activity entry point.

use std::cell::RefCell;

use anyhow::Result;
use jni::objects::{JObject, JString, JValue};
use jni::{JNIEnv, JavaVM};
use tracing::{error, info, warn};
use winit::event_loop::EventLoop;
use winit::platform::android::EventLoopBuilderExtAndroid;
use winit::platform::android::activity::AndroidApp;

use vkplay_core::Config;

/// `getStringExtra(name)` on the launch intent, `None` when the extra is absent.
fn string_extra(env: &mut JNIEnv<'_>, intent: &JObject<'_>, name: &str) -> Result<Option<String>> {
    let name = env.new_string(name)?;
    let value = env
        .call_method(
            intent,
            "getStringExtra",
            "(Ljava/lang/String;)Ljava/lang/String;",
            &[JValue::Object(&name)],
        )?
        .l()?;

    if value.is_null() {
        return Ok(None);
    }
    let value = JString::from(value);
    let value: String = env.get_string(&value)?.into();
    Ok(Some(value))
}

/// Build the config from the activity's intent extras.
fn read_config(app: &AndroidApp) -> Result<Config> {
    // SAFETY: the VM pointer is valid for the whole life of the process.
    let vm = unsafe { JavaVM::from_raw(app.vm_as_ptr().cast()) }?;
    let mut env = vm.attach_current_thread()?;

    // SAFETY: the activity is a global reference owned by the native activity
    // glue and outlives this call; `JObject` never deletes it.
    let activity = unsafe { JObject::from_raw(app.activity_as_ptr().cast()) };
    let intent = env
        .call_method(&activity, "getIntent", "()Landroid/content/Intent;", &[])?
        .l()?;

    let env = RefCell::new(env);
    let config = Config::from_lookup(|key| {
        match string_extra(&mut env.borrow_mut(), &intent, key) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to read intent extra {}: {}", key, e);
                None
            }
        }
    })?;
    Ok(config)
}

fn play(app: AndroidApp) -> Result<()> {
    let config = read_config(&app)?;
    let event_loop = EventLoop::builder().with_android_app(app).build()?;
    crate::run(event_loop, &config)
}

#[unsafe(no_mangle)]
fn android_main(app: AndroidApp) {
    vkplay_core::init_logging();
    info!("Starting vkplay");

    if let Err(e) = play(app) {
        error!("vkplay failed: {:#}", e);
    }
}
