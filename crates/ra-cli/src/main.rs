use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use ra_core::{
    AnchorStore, Annotation, AnnotationScene, AnnotationType, MemoryRoot, SessionController,
    TrackingQuality, Vec3, millis_to_iso8601, now_unix_millis,
};
use ra_store::{Config, DB_FILE, Store};

#[derive(Parser)]
#[command(name = "ra", about = "Spatial annotation store and scene simulator")]
struct Cli {
    /// Data directory (defaults to $RA_DATA_DIR, then ~/.reality-annotation)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Place an annotation at a world position, reusing a nearby anchor
    #[command(allow_negative_numbers = true)]
    Place {
        x: f64,
        y: f64,
        z: f64,

        /// Annotation body text
        #[arg(long)]
        content: String,

        #[arg(long)]
        title: Option<String>,

        /// text, photo, voice, drawing or link
        #[arg(long = "type", default_value = "text")]
        annotation_type: String,

        #[arg(long, default_value = "local")]
        owner: String,
    },

    /// List stored annotations
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored anchors
    Anchors,

    /// Delete an annotation by id
    Remove { id: Uuid },

    /// Cast a ray through the stored annotations and report the closest hit
    #[command(allow_negative_numbers = true)]
    Pick {
        /// Ray origin as X,Y,Z
        #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
        origin: Vec3,

        /// Ray direction as X,Y,Z
        #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
        direction: Vec3,
    },

    /// Run a tracking session and frame loop with a fixed camera
    #[command(allow_negative_numbers = true)]
    Simulate {
        #[arg(long, default_value_t = 60)]
        frames: u32,

        /// Camera position as X,Y,Z
        #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
        camera: Vec3,

        /// Frames per second
        #[arg(long, default_value_t = 60.0)]
        fps: f64,
    },

    /// Show store statistics
    Stats,

    /// Export anchors to a JSON file
    Export {
        /// Output file path
        path: PathBuf,
    },

    /// Import anchors from a JSON file, replacing the stored set
    Import {
        /// Input file path
        path: PathBuf,
    },
}

fn parse_vec3(s: &str) -> std::result::Result<Vec3, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, z] = parts.as_slice() else {
        return Err(format!("expected X,Y,Z, got '{s}'"));
    };
    let parse = |v: &str| {
        v.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .ok_or_else(|| format!("invalid coordinate '{v}'"))
    };
    Ok(Vec3::new(parse(x)?, parse(y)?, parse(z)?))
}

fn data_dir(cli: &Cli) -> PathBuf {
    cli.data_dir
        .clone()
        .unwrap_or_else(ra_store::default_base_dir)
}

fn open_store(cli: &Cli) -> Result<Store> {
    let dir = data_dir(cli);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    Store::open(&dir.join(DB_FILE)).context("failed to open annotation store")
}

fn load_config(cli: &Cli) -> Result<Config> {
    Config::load(&data_dir(cli)).context("failed to load config")
}

fn load_anchors(store: &Store) -> Result<Arc<AnchorStore>> {
    let anchors = Arc::new(AnchorStore::new());
    anchors.restore_from_anchor_data(&store.load_anchors().context("failed to load anchors")?);
    Ok(anchors)
}

/// Scene over every stored annotation, honoring stored layer visibility.
fn build_scene(store: &Store, config: &Config) -> Result<AnnotationScene<MemoryRoot>> {
    let anchors = load_anchors(store)?;
    let mut scene = AnnotationScene::with_config(anchors, config.scene.clone());
    scene.set_root_entity(MemoryRoot::new());
    for layer in store.load_layers().context("failed to load layers")? {
        if !layer.is_visible {
            scene.set_layer_visible(layer.id, false);
        }
    }
    let annotations = store
        .load_annotations()
        .context("failed to load annotations")?;
    scene.reload_annotations(&annotations);
    Ok(scene)
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Place {
            x,
            y,
            z,
            content,
            title,
            annotation_type,
            owner,
        } => cmd_place(
            &cli,
            Vec3::new(*x, *y, *z),
            content,
            title.as_deref(),
            annotation_type,
            owner,
        ),
        Commands::List { json } => cmd_list(&cli, *json),
        Commands::Anchors => cmd_anchors(&cli),
        Commands::Remove { id } => cmd_remove(&cli, *id),
        Commands::Pick { origin, direction } => cmd_pick(&cli, *origin, *direction),
        Commands::Simulate {
            frames,
            camera,
            fps,
        } => cmd_simulate(&cli, *frames, *camera, *fps),
        Commands::Stats => cmd_stats(&cli),
        Commands::Export { path } => cmd_export(&cli, path),
        Commands::Import { path } => cmd_import(&cli, path),
    }
}

fn cmd_place(
    cli: &Cli,
    position: Vec3,
    content: &str,
    title: Option<&str>,
    annotation_type: &str,
    owner: &str,
) -> Result<()> {
    if !position.is_finite() {
        bail!("position must be finite");
    }
    let store = open_store(cli)?;
    let anchors = load_anchors(&store)?;
    let layer = store.default_layer().context("failed to get default layer")?;

    let (anchor_id, reused) = anchors
        .resolve(position)
        .context("position cannot be anchored")?;
    let mut annotation = Annotation::new(
        AnnotationType::from_str_lossy(annotation_type),
        content,
        position,
        layer.id,
        owner,
        now_unix_millis(),
    );
    if let Some(title) = title {
        annotation = annotation.with_title(title);
    }
    annotation.anchor_id = Some(anchor_id);

    if reused {
        store
            .upsert_annotation(&annotation)
            .context("failed to save annotation")?;
    } else {
        store
            .save_placement(&annotation, &anchors.anchor_data())
            .context("failed to save annotation and anchors")?;
    }

    println!("placed {}", annotation.id);
    println!(
        "anchor {anchor_id} ({})",
        if reused { "reused" } else { "new" }
    );
    Ok(())
}

fn cmd_list(cli: &Cli, json: bool) -> Result<()> {
    let store = open_store(cli)?;
    let annotations = store
        .load_annotations()
        .context("failed to load annotations")?;

    if json {
        let out =
            serde_json::to_string_pretty(&annotations).context("failed to serialize annotations")?;
        println!("{out}");
        return Ok(());
    }
    if annotations.is_empty() {
        println!("no annotations");
        return Ok(());
    }
    for a in &annotations {
        let anchor = a
            .anchor_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<7} ({:.2}, {:.2}, {:.2})  anchor={anchor}  {}",
            a.id,
            a.annotation_type.as_str(),
            a.position.x,
            a.position.y,
            a.position.z,
            a.display_title(),
        );
    }
    Ok(())
}

fn cmd_anchors(cli: &Cli) -> Result<()> {
    let store = open_store(cli)?;
    let anchors = store.load_anchors().context("failed to load anchors")?;
    if anchors.is_empty() {
        println!("no anchors");
        return Ok(());
    }
    for a in &anchors {
        println!(
            "{}  ({:.3}, {:.3}, {:.3})  {}",
            a.id,
            a.position.x,
            a.position.y,
            a.position.z,
            millis_to_iso8601(a.timestamp),
        );
    }
    Ok(())
}

fn cmd_remove(cli: &Cli, id: Uuid) -> Result<()> {
    let store = open_store(cli)?;
    if !store
        .delete_annotation(id)
        .context("failed to delete annotation")?
    {
        bail!("no annotation with id {id}");
    }
    println!("removed {id}");
    Ok(())
}

fn cmd_pick(cli: &Cli, origin: Vec3, direction: Vec3) -> Result<()> {
    let store = open_store(cli)?;
    let config = load_config(cli)?;
    let scene = build_scene(&store, &config)?;

    match scene.pick(origin, direction) {
        Some(hit) => {
            let title = store
                .get_annotation(hit.annotation_id)
                .context("failed to load annotation")?
                .map(|a| a.display_title().to_string())
                .unwrap_or_default();
            println!(
                "hit {} at {:.3}m ({:.3}, {:.3}, {:.3})  {title}",
                hit.annotation_id, hit.distance, hit.point.x, hit.point.y, hit.point.z,
            );
        }
        None => println!("no hit"),
    }
    Ok(())
}

fn cmd_simulate(cli: &Cli, frames: u32, camera: Vec3, fps: f64) -> Result<()> {
    if !fps.is_finite() || fps <= 0.0 {
        bail!("fps must be positive");
    }
    let store = open_store(cli)?;
    let config = load_config(cli)?;
    let mut scene = build_scene(&store, &config)?;

    let session = SessionController::new();
    session.start();
    session.update_tracking_quality(TrackingQuality::Normal);

    let dt = 1.0 / fps;
    let mut updates = 0u32;
    let mut last = None;
    for _ in 0..frames {
        if !session.is_tracking() {
            break;
        }
        let stats = scene.update(camera, dt);
        if stats.ran {
            updates += 1;
            last = Some(stats);
        }
    }
    let transition = session.stop();
    tracing::debug!(
        "session {} -> {}",
        transition.from.as_str(),
        transition.to.as_str()
    );

    let (visible, hidden) = last.map(|s| (s.visible, s.hidden)).unwrap_or((0, 0));
    println!("frames:   {frames}");
    println!("updates:  {updates}");
    println!("entities: {}", scene.len());
    println!("visible:  {visible}");
    println!("hidden:   {hidden}");
    println!("dangling: {}", scene.dangling_anchors().len());
    println!("session:  {}", session.state().as_str());
    Ok(())
}

fn cmd_stats(cli: &Cli) -> Result<()> {
    let store = open_store(cli)?;
    let annotations = store
        .load_annotations()
        .context("failed to load annotations")?;
    let anchors = load_anchors(&store)?;
    let layers = store.load_layers().context("failed to load layers")?;
    let dangling = annotations
        .iter()
        .filter(|a| a.anchor_id.is_some_and(|id| !anchors.contains(id)))
        .count();
    let hidden_layers = layers.iter().filter(|l| !l.is_visible).count();

    println!("data_dir:    {}", data_dir(cli).display());
    println!("annotations: {}", annotations.len());
    println!("anchors:     {}", anchors.len());
    println!("layers:      {} ({hidden_layers} hidden)", layers.len());
    println!("dangling:    {dangling}");
    Ok(())
}

fn cmd_export(cli: &Cli, path: &Path) -> Result<()> {
    let store = open_store(cli)?;
    let count = store.anchor_count().context("failed to count anchors")?;
    store
        .export_anchors_json_file(path)
        .with_context(|| format!("failed to export to {}", path.display()))?;

    println!("exported {count} anchors to {}", path.display());
    Ok(())
}

fn cmd_import(cli: &Cli, path: &Path) -> Result<()> {
    let store = open_store(cli)?;
    let count = store
        .import_anchors_json_file(path)
        .context("failed to import JSON")?;

    println!("imported {count} anchors from {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vec3() {
        assert_eq!(parse_vec3("1,-2.5, 3").unwrap(), Vec3::new(1.0, -2.5, 3.0));
        assert!(parse_vec3("1,2").is_err());
        assert!(parse_vec3("1,2,3,4").is_err());
        assert!(parse_vec3("a,b,c").is_err());
        assert!(parse_vec3("1,NaN,3").is_err());
    }
}
