use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{info, warn};
use nalgebra::Point3;
use rand::{rngs::StdRng, Rng, SeedableRng};

use octsearch::{
    search::{MeshSearch, MeshSearchSettings, PolyMesh, SearchMethod},
    shapes::PointShapes,
    Octree, Settings, TreeBoundBox,
};

/// Octree query demo and self-check
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    cmd: Command,

    /// Seed for the random number generator
    #[clap(short, long, default_value_t = 0)]
    seed: u64,

    /// Number of query samples
    #[clap(short = 'N', long, default_value_t = 1000)]
    samples: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Nearest-point queries over a random point cloud
    Points {
        #[clap(flatten)]
        settings: TreeSettings,

        /// Number of points in the cloud
        #[clap(short, long, default_value_t = 100_000)]
        n: usize,

        /// Save the tree to this file, then reload and check it
        #[clap(short, long)]
        out: Option<PathBuf>,

        /// Print the tree structure to stdout
        #[clap(long)]
        print: bool,
    },

    /// Cell location and boundary queries on a block of hexahedral cells
    Mesh {
        /// Number of cells along each axis
        #[clap(long, num_args = 3, default_values_t = [20, 20, 20])]
        cells: Vec<usize>,

        /// Search strategy
        #[clap(short, long, value_enum, default_value_t = Method::Tree)]
        method: Method,
    },
}

#[derive(Parser)]
struct TreeSettings {
    /// Maximum tree depth
    #[clap(long, default_value_t = Settings::default().max_levels)]
    max_levels: usize,

    /// Target bucket size
    #[clap(long, default_value_t = Settings::default().max_leaf_ratio)]
    leaf_ratio: f64,

    /// Maximum allowed duplicity
    #[clap(long, default_value_t = Settings::default().max_duplicity)]
    duplicity: f64,
}

impl From<&TreeSettings> for Settings {
    fn from(s: &TreeSettings) -> Self {
        Settings {
            max_levels: s.max_levels,
            max_leaf_ratio: s.leaf_ratio,
            max_duplicity: s.duplicity,
            ..Settings::default()
        }
    }
}

#[derive(ValueEnum, Copy, Clone)]
enum Method {
    Tree,
    Linear,
    Walk,
}

fn random_points(
    rng: &mut StdRng,
    bb: &TreeBoundBox,
    n: usize,
) -> Vec<Point3<f64>> {
    (0..n)
        .map(|_| {
            Point3::new(
                rng.gen_range(bb.min.x..bb.max.x),
                rng.gen_range(bb.min.y..bb.max.y),
                rng.gen_range(bb.min.z..bb.max.z),
            )
        })
        .collect()
}

fn run_points(
    args: &Args,
    settings: &TreeSettings,
    n: usize,
    out: Option<&PathBuf>,
    print: bool,
) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let unit = TreeBoundBox::new(
        Point3::new(-1.0, -1.0, -1.0),
        Point3::new(1.0, 1.0, 1.0),
    );
    let pts = random_points(&mut rng, &unit, n);
    let samples = random_points(&mut rng, &unit.extend(0.1), args.samples);

    let bb = TreeBoundBox::from_points(&pts).extend(1e-4);
    let start = Instant::now();
    let tree = Octree::build(PointShapes::new(&pts), bb, settings.into())?;
    info!(
        "Built tree over {n} points in {:?} ({} nodes)",
        start.elapsed(),
        tree.nodes().len()
    );
    if print {
        tree.print(&mut std::io::stdout().lock(), false)?;
    }

    let start = Instant::now();
    let hits = tree.find_nearest_many(&samples, f64::MAX);
    info!(
        "Ran {} nearest queries in {:?}",
        samples.len(),
        start.elapsed()
    );

    let start = Instant::now();
    let mut bad = 0;
    for (s, hit) in samples.iter().zip(&hits) {
        let best = pts
            .iter()
            .map(|p| (p - s).norm_squared())
            .fold(f64::INFINITY, f64::min);
        match hit {
            Some(h) if (h.point - s).norm_squared() == best => (),
            _ => {
                warn!("mismatch at {s:?}: {hit:?}");
                bad += 1;
            }
        }
    }
    info!("Checked against brute force in {:?}", start.elapsed());
    if bad > 0 {
        bail!("{bad} nearest queries disagreed with brute force");
    }

    if let Some(path) = out {
        let start = Instant::now();
        tree.save(std::io::BufWriter::new(std::fs::File::create(path)?))?;
        let loaded = Octree::load(
            PointShapes::new(&pts),
            settings.into(),
            std::io::BufReader::new(std::fs::File::open(path)?),
        )?;
        if loaded.nodes() != tree.nodes() {
            bail!("reloaded tree does not match");
        }
        info!("Saved and reloaded {path:?} in {:?}", start.elapsed());
    }
    Ok(())
}

fn run_mesh(args: &Args, cells: &[usize], method: Method) -> Result<()> {
    let &[nx, ny, nz] = cells else {
        bail!("expected three cell counts, got {cells:?}");
    };
    let bb = TreeBoundBox::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));

    let start = Instant::now();
    let mesh = PolyMesh::hex_block(&bb, [nx, ny, nz])?;
    let search = MeshSearch::new(&mesh, MeshSearchSettings::default())?;
    search.cell_tree()?;
    search.boundary_tree()?;
    info!(
        "Built {} cells and search trees in {:?}",
        mesh.cell_count(),
        start.elapsed()
    );

    let mut rng = StdRng::seed_from_u64(args.seed);
    let samples = random_points(&mut rng, &bb.extend(0.05), args.samples);

    let method = match method {
        Method::Tree => SearchMethod::Tree,
        Method::Linear => SearchMethod::Linear,
        Method::Walk => SearchMethod::Walk(0),
    };
    let start = Instant::now();
    let mut found = 0;
    let mut inside = 0;
    let mut bad = 0;
    for s in &samples {
        let cell = search.find_cell(s, method)?;
        found += cell.is_some() as usize;
        let is_inside = search.is_inside(s)?;
        inside += is_inside as usize;
        if cell.is_some() != is_inside && !near_surface(s, &bb) {
            warn!("inconsistent result at {s:?}: {cell:?} vs {is_inside}");
            bad += 1;
        }
    }
    info!(
        "Located {found} / {} samples ({inside} inside) in {:?}",
        samples.len(),
        start.elapsed()
    );

    let start = Instant::now();
    let mut hits = 0;
    for s in &samples {
        let end = Point3::new(bb.max.x + 1.0, s.y, s.z);
        hits += search.intersections(s, &end)?.len();
    }
    info!(
        "Found {hits} boundary intersections in {:?}",
        start.elapsed()
    );

    if bad > 0 {
        bail!("{bad} samples disagreed between find_cell and is_inside");
    }
    Ok(())
}

fn near_surface(p: &Point3<f64>, bb: &TreeBoundBox) -> bool {
    (0..3).any(|i| {
        (p[i] - bb.min[i]).abs() < 1e-9 || (p[i] - bb.max[i]).abs() < 1e-9
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .init();

    let args = Args::parse();
    match &args.cmd {
        Command::Points {
            settings,
            n,
            out,
            print,
        } => run_points(&args, settings, *n, out.as_ref(), *print),
        Command::Mesh { cells, method } => run_mesh(&args, cells, *method),
    }
}
