//! オペレータコンソール
//!
//! GUIはスコープ外のため、制御スレッドの対話インターフェースは
//! 標準入力の行コマンドで代替する。トリガ・除外ゾーン編集・
//! シャーレ直径の変更・状態照会・終了を受け付ける。

use crate::application::pipeline::PipelineHandle;
use crate::domain::{Point, Rectangle};
use std::io::{BufRead, Write};

/// コマンド処理の結果
#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleAction {
    Continue,
    Quit,
}

/// 標準入力からコマンドを読み続ける（Quitで戻る）
pub fn run(handle: &PipelineHandle) -> std::io::Result<()> {
    print_help();

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF（パイプ運転）もQuit扱い
            return Ok(());
        }

        if handle_command(&line, handle) == ConsoleAction::Quit {
            return Ok(());
        }
    }
}

/// 1行のコマンドを解釈して実行する
pub fn handle_command(input: &str, handle: &PipelineHandle) -> ConsoleAction {
    let tokens: Vec<&str> = input.split_whitespace().collect();

    match tokens.as_slice() {
        [] => ConsoleAction::Continue,

        ["q"] | ["quit"] => ConsoleAction::Quit,

        ["help"] => {
            print_help();
            ConsoleAction::Continue
        }

        ["t"] | ["trigger"] => {
            handle.trigger();
            println!("detection triggered");
            ConsoleAction::Continue
        }

        ["status"] => {
            print_status(handle);
            ConsoleAction::Continue
        }

        ["dish", mm] => {
            match mm.parse::<f64>() {
                Ok(d) if d >= 0.0 => {
                    *handle.shared().dish_diameter_mm.lock().unwrap() = d;
                    println!("dish diameter set to {} mm", d);
                }
                _ => println!("usage: dish <mm>  (non-negative number)"),
            }
            ConsoleAction::Continue
        }

        ["zone", "add", x, y, w, h] => {
            match (
                x.parse::<f64>(),
                y.parse::<f64>(),
                w.parse::<f64>(),
                h.parse::<f64>(),
            ) {
                (Ok(x), Ok(y), Ok(w), Ok(h)) => {
                    let added = handle
                        .shared()
                        .exclusion_zones
                        .lock()
                        .unwrap()
                        .add(Rectangle::new(x, y, w, h));
                    if added {
                        println!("exclusion zone added");
                    } else {
                        println!("rejected: zone needs positive width and height");
                    }
                }
                _ => println!("usage: zone add <x> <y> <w> <h>"),
            }
            ConsoleAction::Continue
        }

        ["zone", "del", x, y] => {
            match (x.parse::<f64>(), y.parse::<f64>()) {
                (Ok(x), Ok(y)) => {
                    let removed = handle
                        .shared()
                        .exclusion_zones
                        .lock()
                        .unwrap()
                        .remove_nearest(Point::new(x, y));
                    match removed {
                        Some(zone) => println!(
                            "removed zone {}x{} at ({}, {})",
                            zone.w, zone.h, zone.x, zone.y
                        ),
                        None => println!("no zone contains ({}, {})", x, y),
                    }
                }
                _ => println!("usage: zone del <x> <y>"),
            }
            ConsoleAction::Continue
        }

        ["zone", "list"] => {
            let zones = handle.shared().exclusion_zones.lock().unwrap().snapshot();
            if zones.is_empty() {
                println!("no exclusion zones");
            } else {
                for (i, z) in zones.iter().enumerate() {
                    println!("[{}] {}x{} at ({}, {})", i, z.w, z.h, z.x, z.y);
                }
            }
            ConsoleAction::Continue
        }

        _ => {
            println!("unknown command (try 'help')");
            ConsoleAction::Continue
        }
    }
}

fn print_status(handle: &PipelineHandle) {
    let shared = handle.shared();

    {
        let session = shared.session.lock().unwrap();
        println!(
            "session: {:?}, generation {}, sent {}/{}, corrections {}",
            session.state(),
            session.generation(),
            session.cursor(),
            session.target_count(),
            session.corrections().len()
        );
    }

    let buffered = shared.frame_buffer.lock().unwrap().len();
    let zones = shared.exclusion_zones.lock().unwrap().len();
    let diameter = *shared.dish_diameter_mm.lock().unwrap();
    println!(
        "frames buffered: {}, exclusion zones: {}, dish diameter: {} mm",
        buffered, zones, diameter
    );
}

fn print_help() {
    println!("commands:");
    println!("  t | trigger            run one detection cycle");
    println!("  status                 show session and pipeline state");
    println!("  dish <mm>              set dish diameter");
    println!("  zone add <x> <y> <w> <h>   add exclusion zone");
    println!("  zone del <x> <y>       remove zone nearest to point");
    println!("  zone list              list exclusion zones");
    println!("  q | quit               shut down");
}
