#![forbid(unsafe_code)]

// Native-only tool; keep a stub `main` so wasm32 workspace builds still link.
#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::io::{IoSlice, IoSliceMut};

    use aero_fastsnap::{
        FastSnapConfig, FastSnapshotStore, IoChannel, IoCondition, WatchAction, WatchContext,
    };
    use anyhow::{bail, Context, Result};
    use clap::{Args as ClapArgs, Parser, Subcommand};
    use tracing_subscriber::EnvFilter;

    /// Segment size used when streaming the self-test payload through the channel.
    const SELFTEST_CHUNK: usize = 4096;

    #[derive(Debug, Parser)]
    #[command(
        name = "aero-fastsnap",
        version,
        about = "Fast-snapshot buffer and dirty-tracking tool"
    )]
    pub struct Args {
        /// Log filter (tracing-subscriber EnvFilter syntax). `RUST_LOG` takes precedence.
        ///
        /// Environment variable: `AERO_FASTSNAP_LOG_LEVEL`.
        #[arg(long, env = "AERO_FASTSNAP_LOG_LEVEL", default_value = "info", global = true)]
        log_level: String,

        #[command(subcommand)]
        command: Command,
    }

    #[derive(Debug, Subcommand)]
    enum Command {
        /// Print dirty bitmap and dirty stack sizes for a guest RAM size.
        Sizing(SessionArgs),
        /// Write a patterned payload through a memory channel and read it back.
        Selftest {
            #[command(flatten)]
            session: SessionArgs,

            /// Payload size in bytes.
            #[arg(long, default_value_t = 64 * 1024)]
            bytes: usize,
        },
    }

    #[derive(Debug, ClapArgs)]
    struct SessionArgs {
        /// Guest RAM size in MiB.
        ///
        /// Environment variable: `AERO_FASTSNAP_RAM`.
        #[arg(long, env = "AERO_FASTSNAP_RAM", default_value_t = 64)]
        ram: u64,

        /// Dirty-tracking page size in bytes (defaults to the host page size).
        ///
        /// Environment variable: `AERO_FASTSNAP_PAGE_SIZE`.
        #[arg(long, env = "AERO_FASTSNAP_PAGE_SIZE")]
        page_size: Option<u64>,
    }

    impl SessionArgs {
        fn config(&self, buffer_capacity: usize) -> Result<FastSnapConfig> {
            let ram_size = self
                .ram
                .checked_mul(1024 * 1024)
                .context("RAM size overflow")?;
            Ok(FastSnapConfig {
                ram_size,
                page_size: self.page_size,
                buffer_capacity,
            })
        }
    }

    fn init_tracing(log_level: &str) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    pub fn main() -> Result<()> {
        let args = Args::parse();
        init_tracing(&args.log_level);

        match args.command {
            Command::Sizing(session) => sizing(&session),
            Command::Selftest { session, bytes } => selftest(&session, bytes),
        }
    }

    fn sizing(session: &SessionArgs) -> Result<()> {
        let config = session.config(0)?;
        let sizing = config
            .sizing()
            .context("failed to size dirty tracking structures")?;
        println!("ram_bytes={}", config.ram_size);
        println!("page_size={}", sizing.page_size);
        println!("page_count={}", sizing.page_count);
        println!("bitmap_bytes={}", sizing.bitmap_bytes);
        println!("stack_bytes={}", sizing.stack_bytes);
        Ok(())
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn selftest(session: &SessionArgs, bytes: usize) -> Result<()> {
        let config = session.config(bytes)?;
        let mut store =
            FastSnapshotStore::new(&config).context("failed to create snapshot store")?;
        let payload = pattern(bytes);

        // Save: one chunk per dispatch while the channel reports writable.
        let mut chunks = payload.chunks(SELFTEST_CHUNK);
        let mut save_error = None;
        {
            let mut chan = store.channel();
            let mut ctx = WatchContext::new(&mut chan);
            ctx.add_watch(IoCondition::OUT, |chan, _| match chunks.next() {
                Some(chunk) => match chan.writev(&[IoSlice::new(chunk)]) {
                    Ok(_) => WatchAction::Continue,
                    Err(err) => {
                        save_error = Some(err);
                        WatchAction::Remove
                    }
                },
                None => WatchAction::Remove,
            });
            let dispatched = ctx.run(usize::MAX);
            tracing::debug!(dispatched, "save pass complete");
        }
        if let Some(err) = save_error {
            return Err(err).context("write through memory channel failed");
        }
        if store.buffer().pos() != bytes {
            bail!("save wrote {} bytes, expected {bytes}", store.buffer().pos());
        }

        // Restore: read back until the channel reports a short count.
        store.rewind();
        let mut restored = Vec::with_capacity(bytes);
        {
            let mut chan = store.channel();
            let mut chunk = vec![0u8; SELFTEST_CHUNK];
            loop {
                let n = chan
                    .readv(&mut [IoSliceMut::new(&mut chunk)])
                    .context("read through memory channel failed")?;
                restored.extend_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    break;
                }
            }
            chan.close()?;
        }

        if restored != payload {
            bail!("restored payload does not match saved payload");
        }

        let sizing = store.tracker().sizing();
        tracing::info!(
            bytes,
            page_size = sizing.page_size,
            bitmap_bytes = sizing.bitmap_bytes,
            "self-test passed"
        );
        println!("ok bytes={bytes}");
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    native::main()
}
