fn main() -> anyhow::Result<()> {
    mediacoord_sim::run()
}
