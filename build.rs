use vergen::EmitBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 构建时间戳，给启动日志和 --version 用
    EmitBuilder::builder().all_build().emit()?;
    Ok(())
}
