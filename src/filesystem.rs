use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "coachbook.toml";
pub const DATABASE_FILE_NAME: &str = "coachbook.db";
pub const PHOTOS_DIR_NAME: &str = "photos";

#[cfg(target_os = "android")]
fn android_files_dir() -> Option<PathBuf> {
    use jni::{
        objects::{JObject, JString},
        JavaVM,
    };
    unsafe {
        let ctx = ndk_context::android_context();
        let vm = JavaVM::from_raw(ctx.vm().cast()).ok()?;
        let mut env = vm.attach_current_thread().ok()?; // mutable for JNI calls
        let activity = JObject::from_raw(ctx.context().cast());
        let files_dir = env
            .call_method(activity, "getFilesDir", "()Ljava/io/File;", &[])
            .ok()?
            .l()
            .ok()?;
        let abs_path_obj = env
            .call_method(files_dir, "getAbsolutePath", "()Ljava/lang/String;", &[])
            .ok()?
            .l()
            .ok()?;
        let abs_path_jstring: JString = JString::from(abs_path_obj);
        let abs_path: String = env.get_string(&abs_path_jstring).ok()?.into();
        Some(PathBuf::from(abs_path))
    }
}

/// Get the app data directory for the current platform
pub fn get_app_data_dir() -> PathBuf {
    #[cfg(target_os = "android")]
    {
        if let Some(dir) = android_files_dir() {
            return dir;
        }
        // Fallbacks
        for d in [
            "/data/user/0/de.teilgedanken.coachbook/files",
            "/data/data/de.teilgedanken.coachbook/files",
        ] {
            let p = PathBuf::from(d);
            if p.exists() {
                return p;
            }
        }
        PathBuf::from("./data")
    }

    #[cfg(not(target_os = "android"))]
    {
        // On desktop, use ./data directory
        PathBuf::from("./data")
    }
}

/// Locations of everything the app keeps under one data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub data_dir: PathBuf,
}

impl AppPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Paths for the platform default data directory
    pub fn platform_default() -> Self {
        Self::new(get_app_data_dir())
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE_NAME)
    }

    pub fn database_file(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }

    pub fn photos_dir(&self) -> PathBuf {
        self.data_dir.join(PHOTOS_DIR_NAME)
    }

    /// Resolve a configured path; relative paths are taken from the data dir
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }
}
