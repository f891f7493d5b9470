use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use reqwest::multipart::{Form, Part};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;
use webplyzer::Config;

/// Test harness that runs the server on its own runtime thread
pub struct TestServer {
    _handle: JoinHandle<()>,
    _workspace: TempDir,
    temp_dir: PathBuf,
    port: u16,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(customize: impl FnOnce(&mut Config)) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let port = portpicker::pick_unused_port().expect("No available port");
        let workspace = tempfile::tempdir().expect("Failed to create workspace");

        let mut config = Config {
            listen_on_port: port,
            permits: 2,
            workspace: workspace.path().to_string_lossy().into_owned(),
            ..Default::default()
        };
        customize(&mut config);

        let handle = std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async move {
                webplyzer::run(config).await.expect("server failed");
            });
        });

        let server = TestServer {
            _handle: handle,
            temp_dir: workspace.path().join("temp"),
            _workspace: workspace,
            port,
        };

        // Poll until server is ready
        let client = server.client();
        for _ in 0..200 {
            if let Ok(response) = client.get(server.url("/health")).send().await
                && response.status().is_success()
            {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }

        server
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }

    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap()
    }

    pub async fn convert(&self, form: Form) -> reqwest::Response {
        self.client()
            .post(self.url("/convert"))
            .multipart(form)
            .send()
            .await
            .expect("request failed")
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Wait until every request scratch directory has been released.
    pub async fn wait_for_clean_temp_dir(&self) -> bool {
        for _ in 0..200 {
            let count = std::fs::read_dir(self.temp_dir())
                .map(|entries| entries.count())
                .unwrap_or(0);
            if count == 0 {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

pub fn file_part(name: &str, bytes: Vec<u8>) -> Part {
    Part::bytes(bytes).file_name(name.to_string())
}

pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn jpeg_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Jpeg).unwrap();
    out.into_inner()
}

pub fn opaque_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([30, 120, 200])))
}

pub fn transparent_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0])))
}
