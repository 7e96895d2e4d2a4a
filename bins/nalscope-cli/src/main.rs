//! nalscope - H.264 访问单元边界探测工具
//!
//! 读取 MPEG-TS 文件, 在不解码像素的前提下列出每个编码图像的起始位置,
//! 类型 (IDR/I/P/B) 与结构 (帧/顶场/底场).

mod logging;
mod scan;

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use nalscope_h264::ProbeConfig;
use nalscope_h264::config::{DEFAULT_MAX_NAL_SIZE, DEFAULT_SLICE_HEADER_WINDOW};
use scan::{ScanOptions, ScanReport, ScanSummary, scan_ts};

#[derive(Parser, Debug)]
#[command(name = "nalscope", version, about = "H.264 访问单元边界探测工具")]
struct Cli {
    /// 输入 TS 文件路径 ("-" 表示标准输入)
    input: String,

    /// 视频 PID (十进制或 0x 开头的十六进制); 缺省时锁定第一个视频 PES
    #[arg(long, value_parser = parse_pid)]
    pid: Option<u16>,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 只输出汇总, 不列出每个图像
    #[arg(short, long)]
    quiet: bool,

    /// SPS/PPS 等非 slice NAL 的最大长度 (字节)
    #[arg(long, default_value_t = DEFAULT_MAX_NAL_SIZE)]
    max_nal_size: usize,

    /// slice header 解析窗口 (字节)
    #[arg(long, default_value_t = DEFAULT_SLICE_HEADER_WINDOW)]
    slice_header_window: usize,

    /// 日志详细程度 (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// 日志文件目录 (按天滚动)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            pid: self.pid,
            config: ProbeConfig {
                max_nal_size: self.max_nal_size,
                slice_header_window: self.slice_header_window,
            },
        }
    }
}

fn parse_pid(value: &str) -> Result<u16, String> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse::<u16>(),
    }
    .map_err(|e| format!("非法 PID '{value}': {e}"))?;
    if parsed > 0x1FFF {
        return Err(format!("PID 超出范围 (0-0x1FFF): {value}"));
    }
    Ok(parsed)
}

/// JSON 输出
#[derive(Serialize)]
struct JsonOutput<'a> {
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pictures: Option<&'a [scan::PictureRecord]>,
    summary: &'a ScanSummary,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose, cli.log_dir.as_deref()) {
        eprintln!("错误: {e:#}");
        process::exit(1);
    }

    if let Err(e) = run(&cli) {
        log::error!("{e:#}");
        eprintln!("错误: {e:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let reader = open_input(&cli.input)?;
    let report = scan_ts(reader, &cli.scan_options())
        .with_context(|| format!("扫描 '{}' 失败", cli.input))?;

    if cli.json {
        let output = JsonOutput {
            input: &cli.input,
            pictures: (!cli.quiet).then_some(report.pictures.as_slice()),
            summary: &report.summary,
        };
        let json = serde_json::to_string_pretty(&output).context("序列化 JSON 失败")?;
        println!("{json}");
    } else {
        if !cli.quiet {
            print_pictures_text(&report);
        }
        print_summary_text(&report.summary);
    }
    Ok(())
}

fn open_input(path: &str) -> Result<Box<dyn Read>> {
    if path == "-" {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path).with_context(|| format!("无法打开文件 '{path}'"))?;
    Ok(Box::new(BufReader::new(file)))
}

/// 文本输出: 每个图像一行
fn print_pictures_text(report: &ScanReport) {
    for record in &report.pictures {
        let mut line = format!(
            "[PICTURE #{}] packet={} pid=0x{:04X} type={} structure={}",
            record.index,
            record.packet,
            record.pid,
            record.frame_type.as_deref().unwrap_or("?"),
            record.structure.as_deref().unwrap_or("?"),
        );
        if let Some(pts) = record.pts {
            line.push_str(&format!(" pts={pts}"));
        }
        if record.random_access {
            line.push_str(" rap");
        }
        println!("{line}");
    }
    if !report.pictures.is_empty() {
        println!();
    }
}

/// 文本输出: 汇总
fn print_summary_text(summary: &ScanSummary) {
    println!("[SUMMARY]");
    match summary.pid {
        Some(pid) => println!("  视频 PID     : 0x{pid:04X}"),
        None => println!("  视频 PID     : 未找到"),
    }
    println!("  TS 包总数    : {}", summary.packets);
    println!("  探测包数     : {}", summary.probed_packets);
    println!("  跳过包数     : {}", summary.skipped_packets);
    if summary.invalid_packets > 0 {
        println!("  非法包数     : {}", summary.invalid_packets);
    }
    if summary.duplicate_packets > 0 {
        println!("  重复包数     : {}", summary.duplicate_packets);
    }
    if summary.discontinuities > 0 {
        println!("  不连续次数   : {}", summary.discontinuities);
    }
    if summary.sync_losses > 0 {
        println!("  同步丢失     : {}", summary.sync_losses);
    }

    let types = &summary.frame_types;
    println!("  图像总数     : {}", summary.probe.pictures);
    println!(
        "  图像类型     : IDR={} I={} P={} B={}",
        types.idr, types.i, types.p, types.b
    );

    let probe = &summary.probe;
    println!("  NAL 总数     : {}", probe.nal_units);
    println!("  SPS/PPS 更新 : {}/{}", probe.sps_updates, probe.pps_updates);
    println!(
        "  slice 数     : {} (参数集缺失 {})",
        probe.slices, probe.unresolved_slices
    );
    if probe.rejected_nals > 0 || probe.oversized_nals > 0 {
        println!(
            "  丢弃 NAL     : {} (超长 {})",
            probe.rejected_nals, probe.oversized_nals
        );
    }
    if probe.unconverted_nals > 0 {
        println!("  未转换 NAL   : {}", probe.unconverted_nals);
    }
    println!("[/SUMMARY]");
}
