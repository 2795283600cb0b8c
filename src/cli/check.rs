//! `check`: tool pre-flight without touching the device

use super::AppContext;

pub fn run(ctx: &AppContext) -> anyhow::Result<()> {
    ctx.tools.validate()?;
    println!(
        "All required files present in {}",
        ctx.tools.tool_dir.display()
    );
    Ok(())
}
