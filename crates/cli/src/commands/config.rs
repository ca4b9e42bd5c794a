use anyhow::Result;
use orphansweep_core::domain::MembershipStrategy;
use orphansweep_core::Library;

pub fn batch_size(library: &Library, value: Option<usize>) -> Result<()> {
    match value {
        Some(n) => {
            library.set_batch_size(n)?;
            println!("Batch size set to: {n}");
        }
        None => println!("Batch size: {}", library.batch_size()?),
    }
    Ok(())
}

pub fn strategy(library: &Library, value: Option<MembershipStrategy>) -> Result<()> {
    match value {
        Some(s) => {
            library.set_strategy(s)?;
            println!("Membership strategy set to: {s}");
        }
        None => println!("Membership strategy: {}", library.strategy()?),
    }
    Ok(())
}
