//! Visualization tools: Manim animations, diagrams and interactive plots.
//!
//! Every artifact is written below the configured output directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tokio::fs;
use tokio::process::Command;
use tracing::{info, instrument, warn};

use super::common::{safe_filename, truncate};
use crate::core::config::Config;
use crate::core::security::display_relative;
use crate::domains::tools::{
    CapabilityModule, ParamSpec, ToolArgs, ToolDescriptor, ToolError, ToolOutput, ToolResult,
};

/// Manim quality presets accepted by `create_manim_animation`.
pub const QUALITIES: &[&str] = &[
    "low_quality",
    "medium_quality",
    "high_quality",
    "production_quality",
];

const RENDER_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Deserialize)]
struct AnimationParams {
    scene_name: String,
    scene_code: String,
    quality: Option<String>,
    render: bool,
}

#[derive(Debug, Deserialize)]
struct DiagramParams {
    title: String,
    format: String,
    source: String,
}

#[derive(Debug, Deserialize)]
struct VisualParams {
    title: String,
    expressions: Vec<String>,
    x_min: f64,
    x_max: f64,
}

#[derive(Debug, Clone)]
pub struct VisualizationTools {
    output_dir: PathBuf,
    default_quality: String,
    manim_command: String,
}

impl VisualizationTools {
    pub const NAMESPACE: &'static str = "visualization";

    pub fn new(config: &Config) -> Self {
        Self {
            output_dir: config.paths.output_dir.clone(),
            default_quality: config.settings.manim_quality.clone(),
            manim_command: "manim".to_string(),
        }
    }

    /// Use a different executable for rendering.
    pub fn with_manim_command(mut self, command: impl Into<String>) -> Self {
        self.manim_command = command.into();
        self
    }

    pub fn module(config: &Config) -> CapabilityModule {
        Self::new(config).into_module()
    }

    pub fn into_module(self) -> CapabilityModule {
        CapabilityModule::builder(Self::NAMESPACE, Arc::new(self))
            .tool(
                ToolDescriptor::new(
                    "create_manim_animation",
                    "Write a Manim scene script and optionally render it to video.",
                )
                .param(ParamSpec::string("scene_name", "Scene class name").required())
                .param(
                    ParamSpec::string(
                        "scene_code",
                        "Full scene script, or the body of construct() to wrap in a Scene",
                    )
                    .required(),
                )
                .param(ParamSpec::string("quality", "Render quality").one_of(QUALITIES))
                .param(
                    ParamSpec::boolean("render", "Render the scene with manim")
                        .default_value(json!(false)),
                ),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.animation(args.parse()?).await
                },
            )
            .tool(
                ToolDescriptor::new(
                    "create_static_diagram",
                    "Save a Mermaid or Graphviz diagram (Mermaid also gets an HTML preview).",
                )
                .param(ParamSpec::string("title", "Diagram title").required())
                .param(
                    ParamSpec::string("format", "Diagram language")
                        .default_value(json!("mermaid"))
                        .one_of(&["mermaid", "graphviz"]),
                )
                .param(ParamSpec::string("source", "Diagram source").required()),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.diagram(args.parse()?).await
                },
            )
            .tool(
                ToolDescriptor::new(
                    "create_interactive_visual",
                    "Create a self-contained HTML page plotting functions of x.",
                )
                .param(ParamSpec::string("title", "Page title").required())
                .param(
                    ParamSpec::string_list(
                        "expressions",
                        "JavaScript expressions in x, e.g. 'sin(x)' or 'x**2 / 4'",
                    )
                    .required(),
                )
                .param(ParamSpec::number("x_min", "Left end of the x range").default_value(json!(-10)))
                .param(ParamSpec::number("x_max", "Right end of the x range").default_value(json!(10))),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.interactive(args.parse()?).await
                },
            )
            .build()
    }

    fn relative(&self, path: &Path) -> String {
        display_relative(&self.output_dir, path)
    }

    async fn subdirectory(&self, name: &str) -> Result<PathBuf, ToolError> {
        let dir = self.output_dir.join(name);
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    #[instrument(skip_all, fields(scene = %params.scene_name))]
    async fn animation(&self, params: AnimationParams) -> ToolResult {
        if !is_identifier(&params.scene_name) {
            return Err(ToolError::invalid_arguments(format!(
                "scene_name must be a valid class name: '{}'",
                params.scene_name
            )));
        }
        let quality = params.quality.unwrap_or_else(|| self.default_quality.clone());
        let flag = quality_flag(&quality).ok_or_else(|| {
            ToolError::invalid_arguments(format!("Unknown quality preset: {}", quality))
        })?;

        let scripts = self.subdirectory("scripts").await?;
        let script_path = scripts.join(format!("{}.py", params.scene_name));
        fs::write(
            &script_path,
            scene_script(&params.scene_name, &params.scene_code),
        )
        .await?;
        info!("Wrote scene script {}", script_path.display());

        let mut data = json!({
            "scene_name": &params.scene_name,
            "script_path": self.relative(&script_path),
            "quality": quality,
            "rendered": false,
        });

        if !params.render {
            return Ok(ToolOutput::with_message(data, "Scene script saved"));
        }

        let media_dir = self.output_dir.join("media");
        self.render(&script_path, &params.scene_name, flag, &media_dir)
            .await?;

        let pattern = format!(
            "{}/videos/**/{}.mp4",
            glob::Pattern::escape(&media_dir.to_string_lossy()),
            params.scene_name
        );
        let video = glob::glob(&pattern)
            .ok()
            .and_then(|mut paths| paths.find_map(|p| p.ok()));

        data["rendered"] = json!(true);
        data["video_path"] = json!(video.as_deref().map(|v| self.relative(v)));
        Ok(ToolOutput::with_message(data, "Scene rendered"))
    }

    async fn render(
        &self,
        script: &Path,
        scene: &str,
        flag: &str,
        media_dir: &Path,
    ) -> Result<(), ToolError> {
        let child = Command::new(&self.manim_command)
            .arg(flag)
            .arg("--media_dir")
            .arg(media_dir)
            .arg(script)
            .arg(scene)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ToolError::upstream(format!(
                        "Render failed: '{}' executable not found",
                        self.manim_command
                    ))
                } else {
                    ToolError::upstream(format!("Render failed: {}", e))
                }
            })?;

        let output = tokio::time::timeout(RENDER_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                ToolError::upstream(format!(
                    "Render timed out after {} seconds",
                    RENDER_TIMEOUT.as_secs()
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("manim exited with {}", output.status);
            return Err(ToolError::upstream(format!(
                "Render failed ({}): {}",
                output.status,
                truncate(stderr.trim(), 1000)
            )));
        }
        Ok(())
    }

    async fn diagram(&self, params: DiagramParams) -> ToolResult {
        if params.source.trim().is_empty() {
            return Err(ToolError::invalid_arguments("source must not be empty"));
        }

        let dir = self.subdirectory("diagrams").await?;
        let name = safe_filename(&params.title);
        let extension = if params.format == "graphviz" { "dot" } else { "mmd" };
        let source_path = dir.join(format!("{}.{}", name, extension));
        fs::write(&source_path, &params.source).await?;

        let preview = if params.format == "mermaid" {
            let html_path = dir.join(format!("{}.html", name));
            fs::write(&html_path, mermaid_page(&params.title, &params.source)).await?;
            Some(self.relative(&html_path))
        } else {
            None
        };

        Ok(ToolOutput::with_message(
            json!({
                "title": params.title,
                "format": params.format,
                "source_path": self.relative(&source_path),
                "preview_path": preview,
            }),
            format!("Diagram '{}' saved", params.title),
        ))
    }

    async fn interactive(&self, params: VisualParams) -> ToolResult {
        let expressions: Vec<String> = params
            .expressions
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if expressions.is_empty() {
            return Err(ToolError::invalid_arguments(
                "expressions must contain at least one expression",
            ));
        }
        if !(params.x_min < params.x_max) {
            return Err(ToolError::invalid_arguments(format!(
                "x_min ({}) must be less than x_max ({})",
                params.x_min, params.x_max
            )));
        }

        let dir = self.subdirectory("visuals").await?;
        let path = dir.join(format!("{}.html", safe_filename(&params.title)));
        let page = plot_page(&params.title, &expressions, params.x_min, params.x_max)?;
        fs::write(&path, page).await?;

        Ok(ToolOutput::with_message(
            json!({
                "title": params.title,
                "path": self.relative(&path),
                "expressions": expressions,
                "x_range": [params.x_min, params.x_max],
            }),
            format!("Interactive visual '{}' saved", params.title),
        ))
    }
}

fn quality_flag(quality: &str) -> Option<&'static str> {
    match quality {
        "low_quality" => Some("-ql"),
        "medium_quality" => Some("-qm"),
        "high_quality" => Some("-qh"),
        "production_quality" => Some("-qk"),
        _ => None,
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Complete scene script for `code`.
///
/// Code that already defines the scene class is kept as is (with the manim
/// import added if missing); anything else is treated as the body of
/// `construct()`.
fn scene_script(scene_name: &str, code: &str) -> String {
    let header = "from manim import *\n\n";
    if code.contains(&format!("class {}", scene_name)) {
        if code.contains("from manim import") || code.contains("import manim") {
            code.to_string()
        } else {
            format!("{}{}", header, code)
        }
    } else {
        let body: String = code
            .lines()
            .map(|line| {
                if line.trim().is_empty() {
                    "\n".to_string()
                } else {
                    format!("        {}\n", line)
                }
            })
            .collect();
        format!(
            "{}class {}(Scene):\n    def construct(self):\n{}",
            header, scene_name, body
        )
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn mermaid_page(title: &str, source: &str) -> String {
    let title = escape_html(title);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<script type="module">
import mermaid from "https://cdn.jsdelivr.net/npm/mermaid@10/dist/mermaid.esm.min.mjs";
mermaid.initialize({{ startOnLoad: true }});
</script>
</head>
<body>
<h1>{title}</h1>
<pre class="mermaid">
{source}
</pre>
</body>
</html>
"#,
        title = title,
        source = escape_html(source),
    )
}

fn plot_page(title: &str, expressions: &[String], x_min: f64, x_max: f64) -> Result<String, ToolError> {
    let series = serde_json::to_string(expressions)
        .map_err(|e| ToolError::upstream(format!("Failed to encode expressions: {}", e)))?
        .replace("</", "<\\/");

    Ok(format!(
        r##"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: sans-serif; margin: 2em; }}
canvas {{ border: 1px solid #ccc; }}
.legend span {{ margin-right: 1.5em; }}
</style>
</head>
<body>
<h1>{title}</h1>
<canvas id="plot" width="900" height="540"></canvas>
<div class="legend" id="legend"></div>
<label>x from <input id="xmin" type="number" value="{x_min}"> to <input id="xmax" type="number" value="{x_max}"></label>
<script>
const expressions = {series};
const colors = ["#1f77b4", "#d62728", "#2ca02c", "#ff7f0e", "#9467bd", "#8c564b"];
const fns = expressions.map(e => new Function("x", "with (Math) {{ return (" + e + "); }}"));

function draw() {{
  const xmin = parseFloat(document.getElementById("xmin").value);
  const xmax = parseFloat(document.getElementById("xmax").value);
  if (!(xmin < xmax)) return;
  const canvas = document.getElementById("plot");
  const ctx = canvas.getContext("2d");
  const w = canvas.width, h = canvas.height, n = 800;
  const samples = fns.map(f => {{
    const pts = [];
    for (let i = 0; i <= n; i++) {{
      const x = xmin + (xmax - xmin) * i / n;
      let y;
      try {{ y = f(x); }} catch (err) {{ y = NaN; }}
      pts.push([x, y]);
    }}
    return pts;
  }});
  const ys = samples.flat().map(p => p[1]).filter(Number.isFinite);
  let ymin = ys.length ? Math.min(...ys) : -1, ymax = ys.length ? Math.max(...ys) : 1;
  if (ymin === ymax) {{ ymin -= 1; ymax += 1; }}
  const sx = x => (x - xmin) / (xmax - xmin) * w;
  const sy = y => h - (y - ymin) / (ymax - ymin) * h;
  ctx.clearRect(0, 0, w, h);
  ctx.strokeStyle = "#999";
  ctx.beginPath();
  if (ymin <= 0 && ymax >= 0) {{ ctx.moveTo(0, sy(0)); ctx.lineTo(w, sy(0)); }}
  if (xmin <= 0 && xmax >= 0) {{ ctx.moveTo(sx(0), 0); ctx.lineTo(sx(0), h); }}
  ctx.stroke();
  samples.forEach((pts, i) => {{
    ctx.strokeStyle = colors[i % colors.length];
    ctx.beginPath();
    let pen = false;
    for (const [x, y] of pts) {{
      if (!Number.isFinite(y)) {{ pen = false; continue; }}
      if (pen) ctx.lineTo(sx(x), sy(y)); else ctx.moveTo(sx(x), sy(y));
      pen = true;
    }}
    ctx.stroke();
  }});
  document.getElementById("legend").innerHTML = expressions
    .map((e, i) => '<span style="color:' + colors[i % colors.length] + '">y = ' + e.replace(/</g, "&lt;") + '</span>')
    .join("");
}}

document.getElementById("xmin").addEventListener("change", draw);
document.getElementById("xmax").addEventListener("change", draw);
draw();
</script>
</body>
</html>
"##,
        title = escape_html(title),
        series = series,
        x_min = x_min,
        x_max = x_max,
    ))
}
