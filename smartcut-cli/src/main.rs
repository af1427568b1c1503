//! Command-line front end for `smartcut-core`: parses a keep-list against
//! an H.264/H.265 elementary stream, plans a Smart Cut, and (unless
//! `--dry-run` is given) drives the cut job to a muxed `.mkv` output.
//!
//! Mirrors `client-cli`'s and `avcc`'s `#[derive(StructOpt)] struct Opt`
//! plus `failure`-based `main` error reporting; this is the "external,
//! out-of-scope" CLI surface `spec.md` places outside the core's hard
//! engineering, built anyway so the library has a real caller.

use std::fs;
use std::path::{Path, PathBuf};

use failure::{Error, ResultExt};
use structopt::StructOpt;

use smartcut_core::pipeline::null_codec::{NullDecoder, NullEncoder};
use smartcut_core::{
    audio, mux, sidecar, CutJob, CutProgress, KeepList, KeepRange, SessionConfig, StreamIndex,
};

#[derive(StructOpt)]
#[structopt(name = "smartcut", about = "Cut an H.264/H.265 elementary stream without a full transcode")]
struct Opt {
    /// Input video elementary stream (.264/.h264/.avc or .265/.h265/.hevc).
    #[structopt(parse(from_os_str))]
    input: PathBuf,

    /// A range of frames to keep, in display order: START:END (inclusive).
    /// May be given more than once; ranges must be sorted and non-overlapping.
    #[structopt(long = "keep", parse(try_from_str = parse_keep_range))]
    keep: Vec<KeepRange>,

    /// A file of newline-delimited START:END ranges, used in addition to
    /// any --keep flags.
    #[structopt(long = "keep-file", parse(from_os_str))]
    keep_file: Option<PathBuf>,

    /// One or more audio elementary streams to trim alongside the video.
    #[structopt(long = "audio", parse(from_os_str))]
    audio: Vec<PathBuf>,

    /// Info-sidecar path; defaults to sniffing one next to the input file.
    #[structopt(long = "sidecar", parse(from_os_str))]
    sidecar: Option<PathBuf>,

    /// Re-encode quality factor; defaults to the codec's standard range.
    #[structopt(long = "crf")]
    crf: Option<u8>,

    /// Re-encode preset, passed through to whatever codec backend is wired in.
    #[structopt(long = "preset", default_value = "medium")]
    preset: String,

    /// Output Matroska path.
    #[structopt(long = "out", parse(from_os_str))]
    out: PathBuf,

    /// Plan the cut and print it, without decoding, encoding, or muxing.
    #[structopt(long = "dry-run")]
    dry_run: bool,
}

fn parse_keep_range(s: &str) -> Result<KeepRange, Error> {
    let (start, end) = s
        .split_once(':')
        .ok_or_else(|| failure::format_err!("expected START:END, got {:?}", s))?;
    let start_frame: usize = start.trim().parse().context("invalid START in --keep")?;
    let end_frame: usize = end.trim().parse().context("invalid END in --keep")?;
    Ok(KeepRange { start_frame, end_frame })
}

fn parse_keep_file(path: &Path) -> Result<Vec<KeepRange>, Error> {
    let text = fs::read_to_string(path).with_context(|_| format!("reading keep-file {:?}", path))?;
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(parse_keep_range)
        .collect()
}

fn main() {
    env_logger::Builder::from_default_env().init();
    if let Err(e) = run() {
        log::error!("{}", e);
        for cause in e.iter_causes() {
            log::error!("caused by: {}", cause);
        }
        std::process::exit(1);
    }
}

fn run() -> Result<(), Error> {
    let opt = Opt::from_args();

    let index = StreamIndex::open(&opt.input, None).context("parsing input elementary stream")?;
    log::info!("parsed {} access units, {} GOPs", index.frame_count(), index.gops.len());

    let sidecar_path = opt.sidecar.clone().unwrap_or_else(|| sidecar::sidecar_path_for(&opt.input));
    let sidecar_info = if sidecar_path.exists() {
        log::info!("reading sidecar {:?}", sidecar_path);
        Some(sidecar::parse_sidecar(&sidecar_path)?)
    } else {
        None
    };

    let mut ranges = opt.keep.clone();
    if let Some(keep_file) = &opt.keep_file {
        ranges.extend(parse_keep_file(keep_file)?);
    }
    let keep_list = KeepList::new(ranges)?;

    let config = SessionConfig {
        crf: opt.crf,
        preset: opt.preset.clone(),
        frame_rate_override: None,
        ..SessionConfig::default()
    };
    let frame_rate = config.resolved_frame_rate(sidecar_info.as_ref().and_then(|s| s.frame_rate));
    let muxer_binary = config.muxer_binary.clone();
    let audio_encoder_binary = config.audio_encoder_binary.clone();

    let entries = smartcut_core::plan::plan(&index, &keep_list);
    if opt.dry_run {
        for e in &entries {
            println!(
                "segment [{}, {}]: reencode={:?}..{:?} streamcopy={:?}..{:?} (gop {}..{})",
                e.segment_start,
                e.segment_end,
                e.reencode_start,
                e.reencode_end,
                e.streamcopy_start,
                e.streamcopy_end,
                e.cut_in_gop,
                e.cut_out_gop
            );
        }
        return Ok(());
    }

    let out_dir = opt.out.parent().unwrap_or_else(|| Path::new("."));
    let out_stem = opt.out.file_stem().and_then(|s| s.to_str()).unwrap_or("smartcut");

    log::warn!("no production video codec is linked into this build; using a pass-through placeholder decoder/encoder (see smartcut-core's Open Questions) to exercise the cut pipeline");

    let video_tmp = smartcut_core::proc::temp_path(out_dir, out_stem, "video", "es");
    {
        let mut video_out = fs::File::create(&video_tmp).context("creating temporary video output")?;
        let job = CutJob::new(config);
        let mut decoder = NullDecoder::default();
        let mut progress_cb = |p: CutProgress| {
            log::info!("segment {}/{} ({:.0}%)", p.segment_index + 1, p.segment_count, p.percent_complete);
        };
        let stats = job
            .run(
                &index,
                &keep_list,
                &mut decoder,
                |ctx, rate, q| NullEncoder::open(ctx, rate, q),
                &mut video_out,
                Some(&mut progress_cb),
            )
            .context("running cut job")?;
        log::info!(
            "cut complete: {} segments, {} frames streamcopied, {} frames reencoded, {} bytes written",
            stats.segments,
            stats.frames_streamcopied,
            stats.frames_reencoded,
            stats.bytes_written
        );
    }

    let mut audio_tracks = Vec::new();
    for (i, audio_path) in opt.audio.iter().enumerate() {
        let audio_tmp = smartcut_core::proc::temp_path(out_dir, out_stem, &format!("audio{}", i), "aac");
        audio::trim_audio_track(
            &audio_encoder_binary,
            audio_path,
            &audio_tmp,
            &keep_list,
            frame_rate,
            std::time::Duration::from_secs(10 * 60),
        )
        .with_context(|_| format!("trimming audio track {:?}", audio_path))?;
        let language = mux::default_language_for(audio_path).unwrap_or_else(|| "und".to_string());
        audio_tracks.push(mux::AudioTrackSpec { path: audio_tmp, language });
    }

    let title = mux::deescape_title(opt.input.file_stem().and_then(|s| s.to_str()).unwrap_or("smartcut"));
    let invocation = mux::MuxInvocation {
        output: opt.out.clone(),
        title,
        video_path: video_tmp,
        frame_rate,
        audio_tracks,
        av_offset_ms: sidecar_info.as_ref().and_then(|s| s.av_offset_ms).unwrap_or(0),
        chapter_file: None,
    };
    mux::run_mux(&muxer_binary, &invocation).context("muxing final output")?;
    log::info!("wrote {:?}", opt.out);

    Ok(())
}
