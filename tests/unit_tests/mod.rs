mod lifting;
