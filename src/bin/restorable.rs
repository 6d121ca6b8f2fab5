use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use restorable::{
    Affine, BlendMode, DrawOptions, Engine, EngineConfig, Filter, ImageId, PixelRect, Rgba8,
    SoftwareDevice,
};

#[derive(Parser, Debug)]
#[command(name = "restorable", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run random frames with periodic context loss and compare against an engine that never
    /// loses its context.
    Soak(SoakArgs),
    /// Scale a PNG through the engine, optionally losing the context before writing it out.
    Snapshot(SnapshotArgs),
}

#[derive(Parser, Debug)]
struct SoakArgs {
    /// Number of frames to run.
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// Number of regular images.
    #[arg(long, default_value_t = 8)]
    images: u32,

    /// Width and height of every image.
    #[arg(long, default_value_t = 32)]
    size: u32,

    /// Lose the context after every N-th frame (0 never loses it).
    #[arg(long, default_value_t = 10)]
    lose_every: u32,

    /// Operations issued per frame.
    #[arg(long, default_value_t = 24)]
    ops: u32,

    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Print final engine and device statistics as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct SnapshotArgs {
    /// Input image (any format the `image` crate reads).
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Uniform scale factor.
    #[arg(long, default_value_t = 2.0)]
    scale: f64,

    #[arg(long, value_enum, default_value_t = FilterChoice::Nearest)]
    filter: FilterChoice,

    /// Simulate a context loss (and restore) before reading the result.
    #[arg(long)]
    lose_context: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FilterChoice {
    Nearest,
    Linear,
}

impl From<FilterChoice> for Filter {
    fn from(choice: FilterChoice) -> Self {
        match choice {
            FilterChoice::Nearest => Filter::Nearest,
            FilterChoice::Linear => Filter::Linear,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Soak(args) => cmd_soak(args),
        Command::Snapshot(args) => cmd_snapshot(args),
    }
}

/// xorshift64*, enough to drive a reproducible workload.
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    fn next(&mut self) -> u64 {
        self.0 ^= self.0 >> 12;
        self.0 ^= self.0 << 25;
        self.0 ^= self.0 >> 27;
        self.0.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    fn below(&mut self, n: u32) -> u32 {
        (self.next() % u64::from(n.max(1))) as u32
    }

    fn byte(&mut self) -> u8 {
        (self.next() >> 24) as u8
    }
}

const SOAK_BLENDS: [BlendMode; 5] = [
    BlendMode::SourceOver,
    BlendMode::Lighter,
    BlendMode::Copy,
    BlendMode::DestinationOut,
    BlendMode::Xor,
];

enum Op {
    Draw {
        dst: usize,
        src: usize,
        opts: DrawOptions,
    },
    Fill {
        image: usize,
        color: Rgba8,
    },
    Replace {
        image: usize,
        region: PixelRect,
        pixels: Vec<u8>,
    },
    Read {
        image: usize,
        x: i64,
        y: i64,
    },
}

/// Slot layout: `0..images` regular, then one volatile scratch image.
fn random_op(rng: &mut Rng, images: usize, size: u32) -> Op {
    let slots = images + 1;
    match rng.below(10) {
        0..=5 => {
            let dst = rng.below(slots as u32) as usize;
            let mut src = rng.below(slots as u32) as usize;
            if src == dst {
                src = (src + 1) % slots;
            }
            let half = f64::from(size) / 2.0;
            let opts = DrawOptions {
                geometry: Affine::translate((
                    f64::from(rng.below(size)) - half,
                    f64::from(rng.below(size)) - half,
                )) * Affine::scale(0.5 + f64::from(rng.below(3)) * 0.25),
                blend: SOAK_BLENDS[rng.below(SOAK_BLENDS.len() as u32) as usize],
                filter: if rng.below(2) == 0 {
                    Filter::Nearest
                } else {
                    Filter::Linear
                },
                tint: (rng.below(3) == 0).then(|| Rgba8::new(rng.byte(), rng.byte(), 255, 200)),
                ..DrawOptions::default()
            };
            Op::Draw { dst, src, opts }
        }
        6 => Op::Fill {
            image: rng.below(slots as u32) as usize,
            color: Rgba8::new(rng.byte(), rng.byte(), rng.byte(), rng.byte()),
        },
        7 | 8 => {
            let (x, y) = (rng.below(size), rng.below(size));
            let width = 1 + rng.below(size - x);
            let height = 1 + rng.below(size - y);
            let region = PixelRect::new(x, y, width, height);
            let mut pixels = Vec::with_capacity(region.byte_len());
            for _ in 0..width * height {
                let a = rng.byte();
                let c = |v: u8| (u16::from(v) * u16::from(a) / 255) as u8;
                pixels.extend_from_slice(&[c(rng.byte()), c(rng.byte()), c(rng.byte()), a]);
            }
            Op::Replace {
                image: rng.below(images as u32) as usize,
                region,
                pixels,
            }
        }
        _ => Op::Read {
            image: rng.below(slots as u32) as usize,
            x: i64::from(rng.below(size + 2)) - 1,
            y: i64::from(rng.below(size + 2)) - 1,
        },
    }
}

fn apply(e: &mut Engine<SoftwareDevice>, ids: &[ImageId], op: &Op) -> anyhow::Result<()> {
    match op {
        Op::Draw { dst, src, opts } => e.draw(ids[*dst], ids[*src], opts)?,
        Op::Fill { image, color } => e.fill(ids[*image], *color)?,
        Op::Replace {
            image,
            region,
            pixels,
        } => e.replace_pixels(ids[*image], pixels, *region)?,
        Op::Read { image, x, y } => {
            e.read_pixel(ids[*image], *x, *y)?;
        }
    }
    Ok(())
}

fn setup(args: &SoakArgs) -> anyhow::Result<(Engine<SoftwareDevice>, Vec<ImageId>)> {
    let mut e = Engine::new(SoftwareDevice::new(), EngineConfig::from_env());
    let mut ids = Vec::with_capacity(args.images as usize + 1);
    for _ in 0..args.images {
        ids.push(e.create(args.size, args.size)?);
    }
    ids.push(e.create_volatile(args.size, args.size)?);
    Ok((e, ids))
}

fn cmd_soak(args: SoakArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.images >= 1, "--images must be at least 1");
    anyhow::ensure!(args.size >= 1, "--size must be at least 1");

    let (mut lossy, ids) = setup(&args)?;
    let (mut reference, ref_ids) = setup(&args)?;
    let mut rng = Rng::new(args.seed);
    let mut losses = 0u32;

    for frame in 0..args.frames {
        lossy.on_frame_start()?;
        reference.on_frame_start()?;
        for (i, (&a, &b)) in ids.iter().zip(&ref_ids).enumerate() {
            let got = lossy.read_pixels(a)?;
            let want = reference.read_pixels(b)?;
            anyhow::ensure!(
                got == want,
                "frame {frame}: image slot {i} diverged from the reference"
            );
        }

        for _ in 0..args.ops {
            let op = random_op(&mut rng, args.images as usize, args.size);
            apply(&mut lossy, &ids, &op).with_context(|| format!("frame {frame}: lossy engine"))?;
            apply(&mut reference, &ref_ids, &op)
                .with_context(|| format!("frame {frame}: reference engine"))?;
        }

        lossy.on_frame_end()?;
        reference.on_frame_end()?;
        if args.lose_every > 0 && (frame + 1) % args.lose_every == 0 {
            lossy.device_mut().lose_context();
            losses += 1;
        }
    }

    if args.json {
        let report = serde_json::json!({
            "frames": args.frames,
            "context_losses": losses,
            "engine": lossy.stats(),
            "device": lossy.device().stats(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    eprintln!(
        "soak ok: {} frames, {losses} context losses, {} images",
        args.frames,
        ids.len()
    );
    Ok(())
}

fn cmd_snapshot(args: SnapshotArgs) -> anyhow::Result<()> {
    anyhow::ensure!(
        args.scale.is_finite() && args.scale > 0.0,
        "--scale must be positive"
    );
    let input = image::open(&args.in_path)
        .with_context(|| format!("open image '{}'", args.in_path.display()))?
        .to_rgba8();

    let mut e = Engine::new(SoftwareDevice::new(), EngineConfig::from_env());
    let src = e.create_from_image(&input)?;
    let width = ((f64::from(input.width()) * args.scale).round() as u32).max(1);
    let height = ((f64::from(input.height()) * args.scale).round() as u32).max(1);
    let dst = e.create(width, height)?;
    let opts = DrawOptions {
        geometry: Affine::scale(args.scale),
        filter: args.filter.into(),
        ..DrawOptions::default()
    };
    e.draw(dst, src, &opts)?;
    e.on_frame_end()?;

    if args.lose_context {
        e.device_mut().lose_context();
        let restored = e.on_context_lost()?;
        eprintln!("restored {restored} images");
    }

    let mut out = e.snapshot(dst)?;
    for px in out.pixels_mut() {
        let a = u16::from(px.0[3]);
        if a > 0 && a < 255 {
            for c in &mut px.0[..3] {
                *c = ((u16::from(*c) * 255 + a / 2) / a).min(255) as u8;
            }
        }
    }

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    out.save_with_format(&args.out, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}
